//! LogQL stream selectors for the labels the log shipper attaches.

/// Every line logged by any allocation of a job.
pub fn job_selector(job_id: &str) -> String {
    format!("{{job_id={job_id:?}}}")
}

/// Lines of one task group inside one allocation.
pub fn allocation_selector(alloc_id: &str, task_group: &str) -> String {
    format!("{{alloc_id={alloc_id:?}, task_group={task_group:?}}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_selector() {
        assert_eq!(job_selector("abc"), r#"{job_id="abc"}"#);
    }

    #[test]
    fn test_allocation_selector_quotes_values() {
        assert_eq!(
            allocation_selector("a-1", "build"),
            r#"{alloc_id="a-1", task_group="build"}"#
        );
        assert_eq!(
            allocation_selector("a", r#"we"ird"#),
            r#"{alloc_id="a", task_group="we\"ird"}"#
        );
    }
}
