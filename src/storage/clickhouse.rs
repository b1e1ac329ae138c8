//! ClickHouse storage over the HTTP interface
//!
//! Requests go through a pooled `ureq` agent. Rows are encoded as
//! `JSONCompactEachRow`: one JSON array per line, positional under the
//! column list of the `INSERT`.

use crate::core::{ClickHouseConfig, Credentials, HookError, Result, Row, Storage, TableRef};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

const USER_HEADER: &str = "X-ClickHouse-User";
const KEY_HEADER: &str = "X-ClickHouse-Key";

/// HTTP client for one ClickHouse server
///
/// # Example
///
/// ```no_run
/// use clickhouse_hook::storage::ClickHouseStorage;
/// use clickhouse_hook::ClickHouseConfig;
///
/// let config = ClickHouseConfig::new("logs", "nginx_logs", vec!["remote_addr".into()])
///     .with_host("clickhouse-server", 8123);
/// let storage = ClickHouseStorage::connect(&config).expect("ClickHouse unreachable");
/// ```
#[derive(Clone)]
pub struct ClickHouseStorage {
    base_url: String,
    credentials: Credentials,
    compression: bool,
    agent: ureq::Agent,
}

/// Why a request did not come back with a success status
enum RequestError {
    /// Rejected before anything was sent
    Header(String),
    Status(u16, String),
    Transport(String),
}

impl RequestError {
    fn describe(self) -> String {
        match self {
            RequestError::Header(message) | RequestError::Transport(message) => message,
            RequestError::Status(status, body) => format!("status {}: {}", status, body.trim()),
        }
    }
}

impl ClickHouseStorage {
    /// Client for `config` without contacting the server
    pub fn new(config: &ClickHouseConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(config.timeout)
            .timeout_read(config.timeout)
            .timeout_write(config.timeout)
            .build();

        Self {
            base_url: format!("http://{}/", config.address()),
            credentials: config.credentials.clone(),
            compression: config.compression,
            agent,
        }
    }

    /// Client for `config`, checked with `GET /ping`
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the server cannot be reached or does not
    /// answer the ping with a success status.
    pub fn connect(config: &ClickHouseConfig) -> Result<Self> {
        let storage = Self::new(config);
        storage.ping()?;
        Ok(storage)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: ureq::Request) -> std::result::Result<ureq::Request, RequestError> {
        check_header_value(USER_HEADER, &self.credentials.user)?;
        let request = request.set(USER_HEADER, &self.credentials.user);

        if self.credentials.password.is_empty() {
            return Ok(request);
        }
        check_header_value(KEY_HEADER, &self.credentials.password)?;
        Ok(request.set(KEY_HEADER, &self.credentials.password))
    }

    /// Send `request`, returning the body of a 2xx response
    fn execute(
        &self,
        request: ureq::Request,
        body: Option<&[u8]>,
    ) -> std::result::Result<String, RequestError> {
        let request = self.authorize(request)?;
        let result = match body {
            Some(body) => request.send_bytes(body),
            None => request.call(),
        };

        match result {
            // Reading the body returns the connection to the pool
            Ok(response) => response
                .into_string()
                .map_err(|e| RequestError::Transport(e.to_string())),
            Err(ureq::Error::Status(status, response)) => {
                Err(RequestError::Status(status, response.into_string().unwrap_or_default()))
            }
            Err(e) => Err(RequestError::Transport(e.to_string())),
        }
    }

    fn encode_body(&self, rows: &[Row]) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(rows.len() * 64);
        for row in rows {
            serde_json::to_writer(&mut body, row)?;
            body.push(b'\n');
        }

        if !self.compression {
            return Ok(body);
        }

        let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 4), Compression::fast());
        encoder.write_all(&body)?;
        Ok(encoder.finish()?)
    }
}

impl Storage for ClickHouseStorage {
    fn ping(&self) -> Result<()> {
        let request = self.agent.get(&format!("{}ping", self.base_url));

        self.execute(request, None)
            .map(|_| ())
            .map_err(|e| HookError::connection(self.base_url.as_str(), e.describe()))
    }

    fn write(&self, table: &TableRef, columns: &[String], rows: &[Row]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let body = self.encode_body(rows)?;
        let mut request = self
            .agent
            .post(&self.base_url)
            .query("query", &insert_query(table, columns));
        if self.compression {
            request = request.set("Content-Encoding", "gzip");
        }

        self.execute(request, Some(&body))
            .map(|_| ())
            .map_err(|e| HookError::write(table.to_string(), e.describe()))
    }

    fn name(&self) -> &str {
        "clickhouse"
    }
}

impl std::fmt::Debug for ClickHouseStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseStorage")
            .field("base_url", &self.base_url)
            .field("user", &self.credentials.user)
            .field("compression", &self.compression)
            .finish()
    }
}

/// `INSERT INTO `db`.`table` (`a`, `b`) FORMAT JSONCompactEachRow`
pub fn insert_query(table: &TableRef, columns: &[String]) -> String {
    let columns = columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {}.{} ({}) FORMAT JSONCompactEachRow",
        quote_identifier(&table.database),
        quote_identifier(&table.table),
        columns
    )
}

fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
}

/// Header values may not carry control characters other than tab
fn check_header_value(name: &str, value: &str) -> std::result::Result<(), RequestError> {
    if value.chars().any(|c| c.is_control() && c != '\t') {
        return Err(RequestError::Header(format!(
            "{} contains control characters",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{build_row, Record};
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::net::{TcpListener, TcpStream};
    use std::thread;
    use std::time::Duration;

    /// Request as seen by the fake server
    struct Captured {
        head: String,
        body: Vec<u8>,
        /// Held open so the client sees a keep-alive server
        _stream: TcpStream,
    }

    /// Serve one request with `response`, returning what was received
    fn serve_once(response: &'static str) -> (u16, thread::JoinHandle<Captured>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];

            let split = loop {
                let n = stream.read(&mut buf).unwrap();
                assert!(n > 0, "client closed before sending a request");
                raw.extend_from_slice(&buf[..n]);
                if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                    break pos;
                }
            };

            let head = String::from_utf8_lossy(&raw[..split]).into_owned();
            let length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.trim()
                        .eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);

            let mut body = raw[split + 4..].to_vec();
            while body.len() < length {
                let n = stream.read(&mut buf).unwrap();
                body.extend_from_slice(&buf[..n]);
            }

            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            Captured {
                head,
                body,
                _stream: stream,
            }
        });

        (port, handle)
    }

    fn config(port: u16) -> ClickHouseConfig {
        ClickHouseConfig::new("logs", "nginx_logs", vec!["remote_addr".into(), "bytes_sent".into()])
            .with_host("127.0.0.1", port)
            .with_credentials("writer", "s3cret")
            .with_timeout(Duration::from_secs(2))
    }

    fn rows(config: &ClickHouseConfig) -> Vec<Row> {
        (1..=2)
            .map(|n| {
                let record = Record::new()
                    .with_field("remote_addr", format!("10.0.0.{}", n))
                    .with_field("bytes_sent", n);
                build_row(&config.columns, &record).unwrap()
            })
            .collect()
    }

    fn table() -> TableRef {
        TableRef::new("logs", "nginx_logs")
    }

    #[test]
    fn test_insert_query() {
        let query = insert_query(&table(), &["remote_addr".to_string(), "odd`name".to_string()]);
        assert_eq!(
            query,
            "INSERT INTO `logs`.`nginx_logs` (`remote_addr`, `odd\\`name`) FORMAT JSONCompactEachRow"
        );
    }

    #[test]
    fn test_connect_pings_server() {
        let (port, server) = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 4\r\n\r\nOk.\n");

        let storage = ClickHouseStorage::connect(&config(port)).unwrap();
        let captured = server.join().unwrap();

        assert!(captured.head.starts_with("GET /ping HTTP/1.1"));
        assert!(captured.head.contains("X-ClickHouse-User: writer"));
        assert!(captured.head.contains("X-ClickHouse-Key: s3cret"));
        assert_eq!(storage.name(), "clickhouse");
    }

    #[test]
    fn test_connect_fails_on_bad_status() {
        let (port, server) =
            serve_once("HTTP/1.1 503 Service Unavailable\r\nContent-Length: 4\r\n\r\nbusy");

        let err = ClickHouseStorage::connect(&config(port)).unwrap_err();
        server.join().unwrap();

        assert!(matches!(err, HookError::Connection { .. }));
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn test_connect_fails_when_nothing_listens() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = ClickHouseStorage::connect(&config(port)).unwrap_err();
        assert!(matches!(err, HookError::Connection { .. }));
    }

    #[test]
    fn test_write_sends_insert_and_rows() {
        let (port, server) = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        let config = config(port);

        ClickHouseStorage::new(&config)
            .write(&table(), &config.columns, &rows(&config))
            .unwrap();
        let captured = server.join().unwrap();

        let request_line = captured.head.lines().next().unwrap();
        assert!(request_line.starts_with("POST /?query=INSERT"));
        assert!(request_line.contains("JSONCompactEachRow"));
        assert!(!captured.head.contains("Content-Encoding"));
        assert_eq!(
            String::from_utf8(captured.body).unwrap(),
            "[\"10.0.0.1\",1]\n[\"10.0.0.2\",2]\n"
        );
    }

    #[test]
    fn test_write_succeeds_when_server_keeps_connection_open() {
        // The server thread holds its socket until joined, after the write
        let (port, server) = serve_once(
            "HTTP/1.1 200 OK\r\nConnection: keep-alive\r\nContent-Length: 0\r\n\r\n",
        );
        let config = config(port);

        let result = ClickHouseStorage::new(&config).write(&table(), &config.columns, &rows(&config));
        server.join().unwrap();

        assert!(result.is_ok(), "write failed: {:?}", result.err());
    }

    #[test]
    fn test_write_gzip_body() {
        let (port, server) = serve_once("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
        let config = config(port).with_compression(true);

        ClickHouseStorage::new(&config)
            .write(&table(), &config.columns, &rows(&config))
            .unwrap();
        let captured = server.join().unwrap();

        assert!(captured.head.contains("Content-Encoding: gzip"));
        let mut decoded = String::new();
        GzDecoder::new(captured.body.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "[\"10.0.0.1\",1]\n[\"10.0.0.2\",2]\n");
    }

    #[test]
    fn test_write_error_status_with_chunked_body() {
        let (port, server) = serve_once(
            "HTTP/1.1 404 Not Found\r\nTransfer-Encoding: chunked\r\n\r\n\
             9\r\nCode: 60.\r\n10\r\n Table missing. \r\n0\r\n\r\n",
        );
        let config = config(port);

        let err = ClickHouseStorage::new(&config)
            .write(&table(), &config.columns, &rows(&config))
            .unwrap_err();
        server.join().unwrap();

        assert!(err.is_write());
        assert_eq!(
            err.to_string(),
            "Write to logs.nginx_logs failed: status 404: Code: 60. Table missing."
        );
    }

    #[test]
    fn test_password_with_line_break_is_not_sent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        listener.set_nonblocking(true).unwrap();

        let config = config(port).with_credentials("writer", "s3cret\r\nX-Injected: yes");
        let err = ClickHouseStorage::new(&config)
            .write(&table(), &config.columns, &rows(&config))
            .unwrap_err();

        assert!(err.is_write());
        assert!(err.to_string().contains("X-ClickHouse-Key"));
        // Rejected before connecting
        assert!(listener.accept().is_err());
    }

    #[test]
    fn test_empty_write_does_not_connect() {
        let storage = ClickHouseStorage::new(&config(1));
        assert!(storage.write(&table(), &["a".to_string()], &[]).is_ok());
    }
}
