//! Minimal HTTP/1.x request parser and reply writer for the admin surface.
//!
//! Only what a browser or `curl` needs to read the status page and submit a
//! layout edit: one request per connection, bodies by `Content-Length` or
//! chunked transfer, and `multipart/form-data` forms.
//!
//! # Failure model (for beginners)
//!
//! Anything wrong with a request is an [`HttpError::Status`] carrying the
//! status code the client should get back (400, 413, 501).  The caller turns
//! that into a reply with [`HttpReply::error`] instead of dropping the socket,
//! so a misbehaving client still learns what it did wrong.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Longest accepted request, header or chunk-size line, CRLF excluded.
pub const MAX_LINE: usize = 8 * 1024;

/// Largest accepted request body, after chunked decoding.
pub const MAX_BODY: usize = 1024 * 1024;

/// Error type for HTTP request handling.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The request is unacceptable; reply with `status`.
    #[error("HTTP {status}: {detail}")]
    Status { status: u16, detail: String },

    /// The peer closed the connection before sending a request line.
    #[error("connection closed before a request arrived")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HttpError {
    fn status(status: u16, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        debug!(status, "rejecting HTTP request: {detail}");
        HttpError::Status { status, detail }
    }

    fn bad_request(detail: impl Into<String>) -> Self {
        Self::status(400, detail)
    }
}

// ── Headers ───────────────────────────────────────────────────────────────────

/// Header list that keeps arrival order and compares names without case.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(Vec<(String, String)>);

impl Headers {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.0[i].1.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Replaces the value of `name`, adding the header if it is absent.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.position(name) {
            Some(i) => self.0[i].1 = value,
            None => self.0.push((name.to_string(), value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.0.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Adds `value` under `name`, joining it to an earlier value with a comma.
    /// Returns the index the value ended up at.
    fn append(&mut self, name: &str, value: &str) -> usize {
        match self.position(name) {
            Some(i) => {
                let existing = &mut self.0[i].1;
                existing.push(',');
                existing.push_str(value);
                i
            }
            None => {
                self.0.push((name.to_string(), value.to_string()));
                self.0.len() - 1
            }
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

// ── Request ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub uri: String,
    pub major: u32,
    pub minor: u32,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// The URI without its query string.
    pub fn path(&self) -> &str {
        self.uri.split('?').next().unwrap_or("")
    }
}

/// Reads one request from `reader`.
///
/// # Errors
///
/// - [`HttpError::Closed`] if the stream ends before a request line.
/// - [`HttpError::Status`] with 400 for malformed input, 413 for an
///   oversized body and 501 for an unsupported transfer encoding.
/// - [`HttpError::Io`] for socket failures.
pub async fn read_request<R>(reader: &mut R) -> Result<HttpRequest, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let line = loop {
        match read_line(reader).await? {
            None => return Err(HttpError::Closed),
            Some(line) if line.is_empty() => continue,
            Some(line) => break line,
        }
    };

    let (method, uri, major, minor) = parse_request_line(&line)?;
    let mut request = HttpRequest {
        method,
        uri,
        major,
        minor,
        headers: Headers::default(),
        body: Vec::new(),
    };
    read_headers(reader, &mut request.headers).await?;

    if (major, minor) >= (1, 1) && !request.headers.contains("Host") {
        return Err(HttpError::bad_request("Host header missing"));
    }

    let declares_body =
        request.headers.contains("Transfer-Encoding") || request.headers.contains("Content-Length");
    let bodiless_method = request.method == "GET" || request.method == "HEAD";
    if declares_body == bodiless_method {
        return Err(HttpError::bad_request(format!(
            "{} request with{} a body length",
            request.method,
            if declares_body { "" } else { "out" }
        )));
    }

    if let Some(encoding) = request.headers.get("Transfer-Encoding") {
        if !encoding.trim().eq_ignore_ascii_case("chunked") {
            return Err(HttpError::status(501, format!("unsupported Transfer-Encoding {encoding}")));
        }
        request.body = read_chunked_body(reader).await?;
        read_headers(reader, &mut request.headers).await?;
        request.headers.remove("Transfer-Encoding");
        request.headers.set("Content-Length", request.body.len().to_string());
    } else if let Some(length) = request.headers.get("Content-Length") {
        let length: usize = length
            .trim()
            .parse()
            .map_err(|_| HttpError::bad_request(format!("cannot parse Content-Length {length:?}")))?;
        if length > MAX_BODY {
            return Err(HttpError::status(413, format!("body of {length} bytes")));
        }
        let mut body = Vec::with_capacity(length);
        (&mut *reader).take(length as u64).read_to_end(&mut body).await?;
        if body.len() != length {
            return Err(HttpError::bad_request(format!(
                "Content-Length {length} but only {} bytes arrived",
                body.len()
            )));
        }
        request.body = body;
    }

    Ok(request)
}

fn parse_request_line(line: &str) -> Result<(String, String, u32, u32), HttpError> {
    let mut fields = line.split_whitespace();
    let (Some(method), Some(uri), Some(version)) = (fields.next(), fields.next(), fields.next()) else {
        return Err(HttpError::bad_request(format!("bad request line {line:?}")));
    };
    let (major, minor) = version
        .strip_prefix("HTTP/")
        .and_then(|v| v.split_once('.'))
        .and_then(|(major, minor)| Some((major.parse::<u32>().ok()?, minor.parse::<u32>().ok()?)))
        .ok_or_else(|| HttpError::bad_request(format!("bad HTTP version {version:?}")))?;
    if !is_token(method) {
        return Err(HttpError::bad_request(format!("invalid method {method:?}")));
    }
    if major < 1 {
        return Err(HttpError::bad_request(format!("unsupported HTTP version {version}")));
    }
    Ok((method.to_string(), uri.to_string(), major, minor))
}

/// Reads header lines into `headers` up to and including the blank line.
async fn read_headers<R>(reader: &mut R, headers: &mut Headers) -> Result<(), HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut last: Option<usize> = None;
    loop {
        let line = read_line(reader)
            .await?
            .ok_or_else(|| HttpError::bad_request("stream ended inside the headers"))?;
        if line.is_empty() {
            return Ok(());
        }

        if line.starts_with([' ', '\t']) {
            let i = last.ok_or_else(|| HttpError::bad_request("first header is a continuation"))?;
            let value = &mut headers.0[i].1;
            value.push(',');
            value.push_str(line.trim());
            continue;
        }

        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HttpError::bad_request(format!("invalid header {line:?}")))?;
        if !is_token(name) {
            return Err(HttpError::bad_request(format!("invalid header name {name:?}")));
        }
        last = Some(headers.append(name, value.trim()));
    }
}

async fn read_chunked_body<R>(reader: &mut R) -> Result<Vec<u8>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut body = Vec::new();
    loop {
        let line = read_line(reader)
            .await?
            .ok_or_else(|| HttpError::bad_request("stream ended before the last chunk"))?;
        // Chunk extensions after ';' are ignored.
        let size_field = line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_field, 16)
            .map_err(|_| HttpError::bad_request(format!("cannot parse chunk size {line:?}")))?;
        if size == 0 {
            return Ok(body);
        }
        if body.len().saturating_add(size) > MAX_BODY {
            return Err(HttpError::status(413, "chunked body too large"));
        }

        let before = body.len();
        (&mut *reader).take(size as u64).read_to_end(&mut body).await?;
        if body.len() - before != size {
            return Err(HttpError::bad_request("chunk shorter than its size line"));
        }
        match read_line(reader).await? {
            Some(line) if line.is_empty() => {}
            _ => return Err(HttpError::bad_request("missing CRLF after chunk")),
        }
    }
}

/// Reads one line without its line terminator.  `None` means end of stream.
///
/// A final line without terminator is returned as-is.
async fn read_line<R>(reader: &mut R) -> Result<Option<String>, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = MAX_LINE as u64 + 2;
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    if buf.len() > MAX_LINE {
        return Err(HttpError::bad_request(format!("line longer than {MAX_LINE} bytes")));
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| HttpError::bad_request("line is not valid UTF-8"))
}

/// RFC 7230 token: visible ASCII without separators.
fn is_token(s: &str) -> bool {
    const SEPARATORS: &[u8] = b"()<>@,;:\\\"/[]?={} \t";
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_graphic() && !SEPARATORS.contains(&b))
}

// ── Reply ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub major: u32,
    pub minor: u32,
    pub status: u16,
    pub reason: String,
    /// Method of the request being answered; `HEAD` suppresses the body.
    pub method: String,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpReply {
    /// A reply to `request` in the request's protocol version.
    pub fn new(request: &HttpRequest, status: u16) -> Self {
        Self {
            major: request.major,
            minor: request.minor,
            status,
            reason: reason_phrase(status).to_string(),
            method: request.method.clone(),
            headers: Headers::default(),
            body: Vec::new(),
        }
    }

    /// A plain-text reply to a request that could not be parsed.
    pub fn error(status: u16, detail: &str) -> Self {
        let mut reply = Self {
            major: 1,
            minor: 0,
            status,
            reason: reason_phrase(status).to_string(),
            method: String::new(),
            headers: Headers::default(),
            body: Vec::new(),
        };
        reply.set_text(format!("{status} {}: {detail}\n", reply.reason));
        reply
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn set_text(&mut self, text: String) {
        self.headers.set("Content-Type", "text/plain; charset=utf-8");
        self.body = text.into_bytes();
    }

    pub fn set_json(&mut self, json: String) {
        self.headers.set("Content-Type", "application/json");
        self.body = json.into_bytes();
    }

    fn permits_body(&self) -> bool {
        !(self.status / 100 == 1 || self.status == 204 || self.status == 304)
    }
}

/// Writes `reply` and flushes.
///
/// `Date`, `Content-Length` and `Connection` are always generated here;
/// values the caller set for them (or for `Transfer-Encoding`) are dropped.
pub async fn write_reply<W>(writer: &mut W, reply: &HttpReply) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut head = format!(
        "HTTP/{}.{} {} {}\r\nDate: {}\r\n",
        reply.major,
        reply.minor,
        reply.status,
        reply.reason,
        http_date(SystemTime::now())
    );
    for (name, value) in reply.headers.iter() {
        let generated = ["Content-Length", "Date", "Transfer-Encoding", "Connection"]
            .iter()
            .any(|g| g.eq_ignore_ascii_case(name));
        if !generated {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
    }
    let has_body = reply.permits_body();
    if has_body {
        head.push_str(&format!("Content-Length: {}\r\n", reply.body.len()));
    }
    head.push_str("Connection: close\r\n\r\n");

    writer.write_all(head.as_bytes()).await?;
    if has_body && reply.method != "HEAD" {
        writer.write_all(&reply.body).await?;
    }
    writer.flush().await
}

pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        100 => "Continue",
        200 => "OK",
        204 => "No Content",
        304 => "Not Modified",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Formats `time` as an RFC 1123 date, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(time: SystemTime) -> String {
    const DAYS: [&str; 7] = ["Thu", "Fri", "Sat", "Sun", "Mon", "Tue", "Wed"];
    const MONTHS: [&str; 12] = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];

    let secs = time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    let days = secs / 86_400;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days as i64);
    format!(
        "{}, {:02} {} {:04} {:02}:{:02}:{:02} GMT",
        DAYS[(days % 7) as usize],
        day,
        MONTHS[(month - 1) as usize],
        year,
        rem / 3600,
        rem % 3600 / 60,
        rem % 60
    )
}

/// Gregorian `(year, month, day)` for a count of days since 1970-01-01.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

// ── Form data ─────────────────────────────────────────────────────────────────

/// Splits a `multipart/form-data` body into `name → contents`.
///
/// Returns `None` if the request is not a well-formed form.  A later part
/// with the same name replaces an earlier one.
pub fn parse_form_data(request: &HttpRequest) -> Option<BTreeMap<String, Vec<u8>>> {
    let content_type = request.headers.get("Content-Type")?;
    let after_type = find_caseless(content_type.as_bytes(), b"multipart/form-data", 0)? + 19;
    let boundary_at = find_caseless(content_type.as_bytes(), b"boundary=", after_type)? + 9;
    let boundary = content_type[boundary_at..]
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches('"');
    if boundary.is_empty() {
        return None;
    }

    let body = request.body.as_slice();
    let mut at = find(body, boundary.as_bytes(), 0)? + boundary.len();
    let delimiter = format!("\r\n--{boundary}").into_bytes();
    let mut parts = BTreeMap::new();

    loop {
        if body[at..].starts_with(b"--") {
            return Some(parts);
        }
        let next = find(body, &delimiter, at)?;
        let end_of_headers = find(body, b"\r\n\r\n", at)?;
        if end_of_headers > next {
            return None;
        }

        let head = &body[at..end_of_headers + 2];
        let disposition = find_caseless(head, b"content-disposition:", 0)?;
        let line_end = find(head, b"\r\n", disposition)?;
        let name = part_name(&head[disposition..line_end])?;
        parts.insert(name, body[end_of_headers + 4..next].to_vec());

        at = next + delimiter.len();
    }
}

/// The `name=` attribute of a `Content-Disposition` line.
fn part_name(line: &[u8]) -> Option<String> {
    let mut from = 0;
    let start = loop {
        let at = find_caseless(line, b"name=", from)?;
        // Skip `filename=`.
        if at == 0 || !line[at - 1].is_ascii_alphanumeric() {
            break at + 5;
        }
        from = at + 5;
    };

    let rest = &line[start..];
    let raw = if let Some(quoted) = rest.strip_prefix(b"\"") {
        let close = quoted.iter().position(|&b| b == b'"')?;
        &quoted[..close]
    } else {
        let end = rest
            .iter()
            .position(|b| matches!(b, b' ' | b'\t' | b';'))
            .unwrap_or(rest.len());
        &rest[..end]
    };
    String::from_utf8(raw.to_vec()).ok()
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|i| i + from)
}

fn find_caseless(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w.eq_ignore_ascii_case(needle))
        .map(|i| i + from)
}
