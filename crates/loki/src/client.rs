use chrono::{TimeZone, Utc};
use jobtrail_core::{LokiLine, LokiOutput};
use reqwest::Client;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{LokiError, Result};
use crate::selector::{allocation_selector, job_selector};
use crate::types::{LokiConfig, QueryResponse, Stream};

const QUERY_RANGE_PATH: &str = "/loki/api/v1/query_range";

/// Client that assembles complete log listings out of Loki's capped range queries.
pub struct LokiClient {
    base_url: String,
    client: Client,
    page_limit: usize,
    max_lines: usize,
}

/// Where an appended line ended up, so the next page can skip it.
struct Appended {
    time: i64,
    stderr: bool,
    position: usize,
}

impl LokiClient {
    pub fn new(config: &LokiConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(|e| LokiError::Config(e.to_string()))?;

        Self::with_client(config, client)
    }

    pub fn with_client(config: &LokiConfig, client: Client) -> Result<Self> {
        if config.page_limit == 0 || config.max_lines == 0 {
            return Err(LokiError::Config(
                "page_limit and max_lines must be positive".to_string(),
            ));
        }

        Ok(Self {
            base_url: config.address.trim_end_matches('/').to_string(),
            client,
            page_limit: config.page_limit,
            max_lines: config.max_lines,
        })
    }

    pub async fn job_logs(&self, job_id: &str, deadline: Option<Instant>) -> Result<LokiOutput> {
        self.query_range(&job_selector(job_id), deadline).await
    }

    pub async fn allocation_logs(
        &self,
        alloc_id: &str,
        task_group: &str,
        deadline: Option<Instant>,
    ) -> Result<LokiOutput> {
        self.query_range(&allocation_selector(alloc_id, task_group), deadline)
            .await
    }

    /// Pages forward through everything matching `query`, from the epoch up to
    /// the present, until the backend runs dry or `max_lines` lines are collected.
    ///
    /// The upper bound is re-read from the clock for every page so lines written
    /// while paging are picked up. A stream that fills a whole page moves the
    /// cursor to its last timestamp; when several streams do, the last one wins.
    /// Since the cursor is inclusive, the next page repeats the lines already
    /// taken at the cursor timestamp; exactly that many copies of each are
    /// skipped, so genuinely repeated lines survive.
    ///
    /// Any failed page fails the whole call. Once `deadline` passes the call
    /// returns [`LokiError::Cancelled`].
    pub async fn query_range(&self, query: &str, deadline: Option<Instant>) -> Result<LokiOutput> {
        let mut output = LokiOutput::new();
        let mut from: i64 = 0;
        let mut boundary: HashMap<(bool, String), usize> = HashMap::new();
        let mut pages = 0usize;

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(LokiError::Cancelled);
            }

            let end = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
            let streams = with_deadline(deadline, self.fetch_page(query, from, end)).await?;
            pages += 1;

            if streams.is_empty() {
                debug!(query, pages, lines = output.len(), "Loki query exhausted");
                return Ok(output);
            }

            let mut appended: Vec<Appended> = Vec::new();
            let mut next_from: Option<i64> = None;

            for stream in streams {
                let stderr = stream.is_stderr();
                let full = stream.values.len() >= self.page_limit;
                let mut last_time = None;

                for (raw_time, text) in stream.values {
                    let time = parse_timestamp(&raw_time)?;
                    last_time = Some(time);

                    if time == from {
                        if let Some(seen) = boundary.get_mut(&(stderr, text.clone())) {
                            if *seen > 0 {
                                *seen -= 1;
                                continue;
                            }
                        }
                    }

                    let lines = if stderr {
                        &mut output.stderr
                    } else {
                        &mut output.stdout
                    };
                    appended.push(Appended {
                        time,
                        stderr,
                        position: lines.len(),
                    });
                    lines.push(LokiLine {
                        time: Utc.timestamp_nanos(time),
                        text,
                    });

                    if output.len() >= self.max_lines {
                        debug!(query, pages, lines = output.len(), "Loki line cap reached");
                        return Ok(output);
                    }
                }

                if full {
                    next_from = last_time.or(next_from);
                }
            }

            let Some(cursor) = next_from else {
                debug!(query, pages, lines = output.len(), "Loki query complete");
                return Ok(output);
            };

            // A full page sharing one timestamp would otherwise be fetched forever.
            if cursor > from {
                from = cursor;
            } else {
                warn!(
                    query,
                    timestamp = from,
                    page_limit = self.page_limit,
                    "Page filled by a single timestamp, lines beyond the page limit are skipped"
                );
                from += 1;
            }

            boundary.clear();
            for a in appended.iter().filter(|a| a.time == from) {
                let lines = if a.stderr { &output.stderr } else { &output.stdout };
                *boundary
                    .entry((a.stderr, lines[a.position].text.clone()))
                    .or_insert(0) += 1;
            }
        }
    }

    async fn fetch_page(&self, query: &str, start: i64, end: i64) -> Result<Vec<Stream>> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, QUERY_RANGE_PATH))
            .query(&[
                ("query", query.to_string()),
                ("limit", self.page_limit.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("direction", "FORWARD".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(LokiError::Backend {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let parsed: QueryResponse = serde_json::from_slice(&body)?;
        if parsed.data.result_type != "streams" {
            return Err(LokiError::UnexpectedResultType(parsed.data.result_type));
        }

        Ok(serde_json::from_value(parsed.data.result)?)
    }
}

async fn with_deadline<T>(
    deadline: Option<Instant>,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| LokiError::Cancelled)?,
        None => fut.await,
    }
}

fn parse_timestamp(raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|_| LokiError::InvalidTimestamp(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    fn streams_body(result: Value) -> Value {
        json!({
            "status": "success",
            "data": {"resultType": "streams", "result": result}
        })
    }

    fn param(request: &Request, name: &str) -> Option<String> {
        request
            .url
            .query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    /// Serves `total` stdout lines stamped 1..=total ns, honouring `start` and `limit`.
    struct SyntheticLoki {
        total: i64,
    }

    impl Respond for SyntheticLoki {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let start: i64 = param(request, "start").unwrap().parse().unwrap();
            let limit: usize = param(request, "limit").unwrap().parse().unwrap();

            let values: Vec<Value> = (1..=self.total)
                .filter(|ts| *ts >= start)
                .take(limit)
                .map(|ts| json!([ts.to_string(), format!("line {ts}")]))
                .collect();

            let result = if values.is_empty() {
                json!([])
            } else {
                json!([{"stream": {"job_id": "j", "source": "stdout"}, "values": values}])
            };
            ResponseTemplate::new(200).set_body_json(streams_body(result))
        }
    }

    /// Serves a fixed stdout stream, honouring `start` and `limit`.
    struct RecordedLoki {
        lines: Vec<(i64, &'static str)>,
    }

    impl Respond for RecordedLoki {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let start: i64 = param(request, "start").unwrap().parse().unwrap();
            let limit: usize = param(request, "limit").unwrap().parse().unwrap();

            let values: Vec<Value> = self
                .lines
                .iter()
                .filter(|(ts, _)| *ts >= start)
                .take(limit)
                .map(|(ts, text)| json!([ts.to_string(), text]))
                .collect();

            let result = if values.is_empty() {
                json!([])
            } else {
                json!([{"stream": {"source": "stdout"}, "values": values}])
            };
            ResponseTemplate::new(200).set_body_json(streams_body(result))
        }
    }

    async fn recorded_server(lines: Vec<(i64, &'static str)>) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(QUERY_RANGE_PATH))
            .respond_with(RecordedLoki { lines })
            .mount(&server)
            .await;
        server
    }

    async fn synthetic_server(total: i64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(QUERY_RANGE_PATH))
            .respond_with(SyntheticLoki { total })
            .mount(&server)
            .await;
        server
    }

    fn client(server: &MockServer, page_limit: usize) -> LokiClient {
        LokiClient::new(&LokiConfig {
            address: server.uri(),
            page_limit,
            ..LokiConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_paginates_full_pages() {
        let server = synthetic_server(6000).await;
        let loki = client(&server, 5000);

        let output = loki.query_range(r#"{job_id="j"}"#, None).await.unwrap();
        assert_eq!(output.stdout.len(), 6000);
        assert!(output.stderr.is_empty());
        assert_eq!(output.stdout[5999].text, "line 6000");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(param(&requests[0], "start").unwrap(), "0");
        assert_eq!(param(&requests[1], "start").unwrap(), "5000");
        assert_eq!(param(&requests[1], "direction").unwrap(), "FORWARD");
        assert_eq!(param(&requests[1], "limit").unwrap(), "5000");
    }

    #[tokio::test]
    async fn test_stops_at_line_cap() {
        let server = synthetic_server(15000).await;
        let loki = client(&server, 5000);

        let output = loki.query_range(r#"{job_id="j"}"#, None).await.unwrap();
        assert_eq!(output.len(), 10000);
        assert_eq!(output.stdout.last().unwrap().text, "line 10000");

        // the backend still had lines left when aggregation stopped
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(streams_body(json!([]))))
            .expect(1)
            .mount(&server)
            .await;

        let output = client(&server, 5000)
            .query_range(r#"{job_id="none"}"#, None)
            .await
            .unwrap();
        assert_eq!(output, LokiOutput::new());
    }

    #[tokio::test]
    async fn test_classifies_streams_by_source() {
        let server = MockServer::start().await;
        let result = json!([
            {"stream": {"source": "stderr"}, "values": [["1", "err 1"], ["3", "err 2"]]},
            {"stream": {"source": "stdout"}, "values": [["2", "out 1"], ["4", "out 2"]]},
            {"stream": {"task": "main"}, "values": [["5", "unlabelled"]]}
        ]);
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(streams_body(result)))
            .expect(1)
            .mount(&server)
            .await;

        let output = client(&server, 5000).query_range("{}", None).await.unwrap();
        let stderr: Vec<_> = output.stderr.iter().map(|l| l.text.as_str()).collect();
        let stdout: Vec<_> = output.stdout.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(stderr, vec!["err 1", "err 2"]);
        assert_eq!(stdout, vec!["out 1", "out 2", "unlabelled"]);
        assert_eq!(output.stderr[1].time.timestamp_nanos_opt(), Some(3));
    }

    #[tokio::test]
    async fn test_continues_while_any_stream_is_full() {
        let server = MockServer::start().await;
        let pages = [
            (
                "0",
                json!([
                    {"stream": {"source": "stdout"}, "values": [["1", "a1"], ["2", "a2"]]},
                    {"stream": {"source": "stderr"}, "values": [["1", "b1"]]}
                ]),
            ),
            (
                "2",
                json!([{"stream": {"source": "stdout"}, "values": [["2", "a2"], ["3", "a3"]]}]),
            ),
            (
                "3",
                json!([{"stream": {"source": "stdout"}, "values": [["3", "a3"]]}]),
            ),
        ];
        for (start, result) in pages {
            Mock::given(method("GET"))
                .and(query_param("start", start))
                .respond_with(ResponseTemplate::new(200).set_body_json(streams_body(result)))
                .expect(1)
                .mount(&server)
                .await;
        }

        let output = client(&server, 2).query_range("{}", None).await.unwrap();
        let stdout: Vec<_> = output.stdout.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(stdout, vec!["a1", "a2", "a3"]);
        assert_eq!(output.stderr.len(), 1);
    }

    #[tokio::test]
    async fn test_keeps_repeated_lines_across_page_boundary() {
        let server = recorded_server(vec![(1, "a"), (2, "x"), (2, "x"), (3, "b")]).await;

        let output = client(&server, 2).query_range("{}", None).await.unwrap();
        let lines: Vec<_> = output
            .stdout
            .iter()
            .map(|l| (l.time.timestamp_nanos_opt().unwrap(), l.text.as_str()))
            .collect();
        assert_eq!(lines, vec![(1, "a"), (2, "x"), (2, "x"), (3, "b")]);
    }

    #[tokio::test]
    async fn test_single_timestamp_page_moves_past_it() {
        // one more line at ts 5 than fits on a page; it cannot be reached
        let server = recorded_server(vec![(5, "p"), (5, "q"), (5, "r"), (6, "s")]).await;

        let output = client(&server, 2).query_range("{}", None).await.unwrap();
        let texts: Vec<_> = output.stdout.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["p", "q", "s"]);

        let starts: Vec<_> = server
            .received_requests()
            .await
            .unwrap()
            .iter()
            .map(|r| param(r, "start").unwrap())
            .collect();
        assert_eq!(starts, vec!["0", "5", "6"]);
    }

    #[tokio::test]
    async fn test_backend_error_discards_partial_output() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("start", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(streams_body(json!([
                {"stream": {}, "values": [["1", "x"], ["2", "y"]]}
            ]))))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("start", "2"))
            .respond_with(ResponseTemplate::new(503).set_body_string("ingester unavailable"))
            .mount(&server)
            .await;

        let err = client(&server, 2).query_range("{}", None).await.unwrap_err();
        match err {
            LokiError::Backend { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "ingester unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_rejects_non_stream_results() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": {"resultType": "matrix", "result": []}
            })))
            .mount(&server)
            .await;

        let err = client(&server, 10).query_range("{}", None).await.unwrap_err();
        assert!(matches!(err, LokiError::UnexpectedResultType(t) if t == "matrix"));
    }

    #[tokio::test]
    async fn test_deadline_cancels_hung_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(streams_body(json!([])))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let deadline = Instant::now() + Duration::from_millis(100);
        let err = client(&server, 10)
            .query_range("{}", Some(deadline))
            .await
            .unwrap_err();
        assert!(matches!(err, LokiError::Cancelled));
    }

    #[test]
    fn test_rejects_zero_limits() {
        let config = LokiConfig {
            page_limit: 0,
            ..LokiConfig::default()
        };
        assert!(matches!(LokiClient::new(&config), Err(LokiError::Config(_))));
    }
}
