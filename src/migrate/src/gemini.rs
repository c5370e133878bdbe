use std::time::Duration;

use serde::Deserialize;

use crate::options::MigrateConfig;
use migrate_utils::time::parse_go_duration;

/// GeminiClient talks to the destination's HTTP API: the line protocol
/// ingest endpoint and the metadata query endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub results: Vec<QueryResult>,
}

#[derive(Debug, Deserialize)]
pub struct QueryResult {
    #[serde(default)]
    pub series: Vec<QuerySeries>,
}

#[derive(Debug, Deserialize)]
pub struct QuerySeries {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub values: Vec<Vec<serde_json::Value>>,
}

impl GeminiClient {
    pub fn new(config: &MigrateConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(60));
        if config.unsafe_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let http = builder
            .build()
            .map_err(|e| anyhow!("error creating openGemini client: {}", e))?;

        let scheme = if config.ssl { "https" } else { "http" };

        Ok(Self {
            http,
            base_url: format!("{}://{}", scheme, config.out),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// write_batch posts one batch of line protocol points with nanosecond
    /// precision.
    pub async fn write_batch(&self, db: &str, body: String) -> anyhow::Result<()> {
        let url = format!("{}/write", self.base_url);
        let mut req = self
            .http
            .post(url)
            .query(&[("db", db), ("precision", "ns")])
            .body(body);
        if !self.username.is_empty() {
            req = req.basic_auth(&self.username, Some(&self.password));
        }

        let resp = req.send().await.map_err(|e| anyhow!("write failed: {}", e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("write returned {}: {}", status, body));
        }
        Ok(())
    }

    /// query runs a metadata query against the destination.
    pub async fn query(&self, db: &str, q: &str) -> anyhow::Result<QueryResponse> {
        let url = format!("{}/query", self.base_url);
        let mut params = vec![("q", q)];
        if !db.is_empty() {
            params.push(("db", db));
        }

        let mut req = self.http.get(url).query(&params);
        if !self.username.is_empty() {
            req = req.basic_auth(&self.username, Some(&self.password));
        }

        let resp = req.send().await.map_err(|e| anyhow!("query failed: {}", e))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("query returned {}: {}", status, body));
        }

        resp.json::<QueryResponse>()
            .await
            .map_err(|e| anyhow!("query returned invalid body: {}", e))
    }

    /// shard_group_duration asks the destination for the shard group
    /// duration of a retention policy.  With an empty rp the default policy
    /// is selected via the row's "default" column; otherwise the row is
    /// matched by name.  The duration string sits at column index 2.
    pub async fn shard_group_duration(&self, db: &str, rp: &str) -> anyhow::Result<i64> {
        let resp = self.query(db, "SHOW RETENTION POLICIES").await?;

        for result in &resp.results {
            for series in &result.series {
                for row in &series.values {
                    if !row_matches(row, rp) {
                        continue;
                    }
                    let duration = row
                        .get(2)
                        .and_then(|v| v.as_str())
                        .ok_or_else(|| anyhow!("retention policy row has no duration column"))?;
                    return parse_go_duration(duration);
                }
            }
        }

        Err(anyhow!(
            "no matching retention policy found on destination database {:?}",
            db
        ))
    }
}

/// row_matches selects the retention policy row: by name when one is given,
/// otherwise by the boolean "default" column at index 7.
fn row_matches(row: &[serde_json::Value], rp: &str) -> bool {
    if !rp.is_empty() {
        return row.first().and_then(|v| v.as_str()) == Some(rp);
    }

    match row.get(7) {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => s == "true",
        _ => false,
    }
}
