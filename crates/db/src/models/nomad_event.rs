use jobtrail_core::{EventUid, NomadEvent};

use crate::error::DbError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NomadEventRow {
    pub uid: String,
    pub topic: String,
    pub event_type: String,
    pub key: String,
    pub filter_keys: String,
    pub index: i64,
    pub payload: String,
    pub handled: bool,
}

impl NomadEventRow {
    pub fn try_into_domain(self) -> Result<NomadEvent, DbError> {
        let uid: EventUid = self
            .uid
            .parse()
            .map_err(|e| DbError::decode(format!("uid of nomad event {}", self.uid), e))?;
        let filter_keys = serde_json::from_str(&self.filter_keys)
            .map_err(|e| DbError::decode(format!("filter keys of nomad event {uid}"), e))?;
        let payload = serde_json::from_str(&self.payload)
            .map_err(|e| DbError::decode(format!("payload of nomad event {uid}"), e))?;
        let index = u64::try_from(self.index).map_err(|_| {
            DbError::InvalidData(format!("negative index {} on nomad event {uid}", self.index))
        })?;

        Ok(NomadEvent {
            uid,
            topic: self.topic,
            event_type: self.event_type,
            key: self.key,
            filter_keys,
            index,
            payload,
            handled: self.handled,
        })
    }
}

/// SQLite integers are signed; indices above `i64::MAX` cannot be stored.
pub fn index_to_db(index: u64) -> Result<i64, DbError> {
    i64::try_from(index)
        .map_err(|_| DbError::InvalidData(format!("nomad event index {index} out of range")))
}
