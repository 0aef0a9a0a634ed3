use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::{debug, warn};

use crate::config::FetchSettings;
use crate::domain::{FetchFailure, FetchOutcome, file_extension};
use crate::error::AdxError;

const CHUNK_SIZE: usize = 64 * 1024;

/// Job-wide cancellation flag, checked between body chunks. Only library
/// callers trip it; `adx-dl` does not hook signals.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub trait ResourceFetcher: Send + Sync {
    /// Retrieves `url` into memory. `progress` receives non-decreasing
    /// percentages while the transfer is in flight. Never fails past this
    /// boundary: every error comes back as [`FetchOutcome::Failed`].
    fn fetch(&self, url: &str, progress: &dyn Fn(u8), cancel: &CancelToken) -> FetchOutcome;
}

#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, AdxError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&settings.user_agent)
                .map_err(|err| AdxError::HttpClient(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|err| AdxError::HttpClient(err.to_string()))?;
        Ok(Self { client })
    }
}

impl ResourceFetcher for HttpFetcher {
    fn fetch(&self, url: &str, progress: &dyn Fn(u8), cancel: &CancelToken) -> FetchOutcome {
        let extension = file_extension(url);
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(url, error = %err, "rejecting malformed resource url");
                return FetchOutcome::Failed(FetchFailure::InvalidUrl(url.to_string()));
            }
        };
        if cancel.is_cancelled() {
            return FetchOutcome::Failed(FetchFailure::Cancelled);
        }

        debug!(url, "requesting resource");
        let response = match self.client.get(parsed).send() {
            Ok(response) => response,
            Err(err) => return FetchOutcome::Failed(classify_request_error(&err)),
        };
        if !response.status().is_success() {
            let status = response.status().as_u16();
            warn!(url, status, "resource request returned non-success status");
            return FetchOutcome::Failed(FetchFailure::Status(status));
        }

        let total = response.content_length();
        match read_body(response, total, progress, cancel) {
            Ok(payload) => {
                debug!(url, bytes = payload.len(), "resource downloaded");
                FetchOutcome::Bytes { payload, extension }
            }
            Err(failure) => {
                warn!(url, reason = %failure, "resource transfer failed");
                FetchOutcome::Failed(failure)
            }
        }
    }
}

/// Drains `reader` into memory.
///
/// With a known, non-zero `total` the body is read chunk by chunk and
/// `floor(received * 100 / total)` is reported after every chunk. Without one
/// the body is read in full and no progress is reported.
pub fn read_body<R: Read>(
    mut reader: R,
    total: Option<u64>,
    progress: &dyn Fn(u8),
    cancel: &CancelToken,
) -> Result<Vec<u8>, FetchFailure> {
    let Some(total) = total.filter(|total| *total > 0) else {
        let mut payload = Vec::new();
        reader
            .read_to_end(&mut payload)
            .map_err(|err| classify_io_error(&err))?;
        if cancel.is_cancelled() {
            return Err(FetchFailure::Cancelled);
        }
        return Ok(payload);
    };

    let mut payload = Vec::with_capacity(usize::try_from(total).unwrap_or(0).min(1 << 26));
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut last_reported: Option<u8> = None;
    loop {
        if cancel.is_cancelled() {
            return Err(FetchFailure::Cancelled);
        }
        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(classify_io_error(&err)),
        };
        payload.extend_from_slice(&chunk[..read]);

        let percent = percent_of(payload.len() as u64, total);
        if last_reported.is_none_or(|last| percent >= last) {
            progress(percent);
            last_reported = Some(percent);
        }
    }
    Ok(payload)
}

fn percent_of(received: u64, total: u64) -> u8 {
    let percent = (u128::from(received) * 100 / u128::from(total)).min(100);
    percent as u8
}

fn classify_request_error(err: &reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        return FetchFailure::TimedOut;
    }
    if let Some(status) = err.status() {
        return FetchFailure::Status(status.as_u16());
    }
    FetchFailure::Transport(err.to_string())
}

fn classify_io_error(err: &io::Error) -> FetchFailure {
    if err.kind() == io::ErrorKind::TimedOut {
        return FetchFailure::TimedOut;
    }
    FetchFailure::Transport(err.to_string())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::{Cursor, Write};
    use std::net::TcpListener;
    use std::thread;

    use assert_matches::assert_matches;

    use super::*;

    /// Yields `data` in fixed-size pieces, then fails if `fail` is set.
    struct ChunkedReader {
        data: Vec<u8>,
        pos: usize,
        step: usize,
        fail: bool,
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.pos >= self.data.len() {
                if self.fail {
                    return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
                }
                return Ok(0);
            }
            let end = (self.pos + self.step).min(self.data.len()).min(self.pos + buf.len());
            let len = end - self.pos;
            buf[..len].copy_from_slice(&self.data[self.pos..end]);
            self.pos = end;
            Ok(len)
        }
    }

    #[test]
    fn reports_monotonic_progress_with_known_length() {
        let reader = ChunkedReader {
            data: vec![7u8; 1000],
            pos: 0,
            step: 300,
            fail: false,
        };
        let seen = RefCell::new(Vec::new());
        let payload = read_body(
            reader,
            Some(1000),
            &|percent| seen.borrow_mut().push(percent),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(payload.len(), 1000);
        assert_eq!(*seen.borrow(), vec![30, 60, 90, 100]);
    }

    #[test]
    fn no_progress_without_length() {
        let seen = RefCell::new(Vec::new());
        let payload = read_body(
            Cursor::new(b"hello".to_vec()),
            None,
            &|percent| seen.borrow_mut().push(percent),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(payload, b"hello");
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn zero_length_header_reads_everything() {
        let payload = read_body(
            Cursor::new(b"abc".to_vec()),
            Some(0),
            &|_| panic!("no progress expected"),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(payload, b"abc");
    }

    #[test]
    fn progress_is_capped_when_body_exceeds_declared_length() {
        let seen = RefCell::new(Vec::new());
        read_body(
            Cursor::new(vec![0u8; 50]),
            Some(10),
            &|percent| seen.borrow_mut().push(percent),
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(*seen.borrow(), vec![100]);
    }

    #[test]
    fn mid_stream_failure_after_progress() {
        let reader = ChunkedReader {
            data: vec![1u8; 40],
            pos: 0,
            step: 40,
            fail: true,
        };
        let seen = RefCell::new(Vec::new());
        let err = read_body(
            reader,
            Some(100),
            &|percent| seen.borrow_mut().push(percent),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(*seen.borrow(), vec![40]);
        assert_matches!(err, FetchFailure::Transport(_));
    }

    #[test]
    fn cancelled_before_first_chunk() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = read_body(Cursor::new(vec![0u8; 10]), Some(10), &|_| {}, &cancel).unwrap_err();
        assert_eq!(err, FetchFailure::Cancelled);
    }

    /// Answers a single request on a loopback port with `head` and `body`.
    fn serve_once(head: &str, body: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let head = head.to_string();
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                let read = stream.read(&mut buf).unwrap();
                if read == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..read]);
            }
            stream.write_all(head.as_bytes()).unwrap();
            stream.write_all(&body).unwrap();
        });
        format!("http://{addr}")
    }

    fn loopback_fetcher() -> HttpFetcher {
        let client = Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();
        HttpFetcher { client }
    }

    #[test]
    fn http_error_status_is_a_failure() {
        let base = serve_once(
            "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            Vec::new(),
        );
        let outcome =
            loopback_fetcher().fetch(&format!("{base}/audio/1.ogg"), &|_| {}, &CancelToken::new());
        assert_eq!(outcome, FetchOutcome::Failed(FetchFailure::Status(404)));
    }

    #[test]
    fn http_body_with_length_reports_progress() {
        let body = vec![5u8; 200_000];
        let head = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let base = serve_once(&head, body.clone());

        let seen = RefCell::new(Vec::new());
        let outcome = loopback_fetcher().fetch(
            &format!("{base}/audio/1.ogg?sig=x"),
            &|percent| seen.borrow_mut().push(percent),
            &CancelToken::new(),
        );

        assert_matches!(outcome, FetchOutcome::Bytes { payload, extension } => {
            assert_eq!(payload, body);
            assert_eq!(extension, "ogg");
        });
        let seen = seen.into_inner();
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn http_body_without_length_reports_no_progress() {
        let base = serve_once(
            "HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n",
            b"&title=Xevel".to_vec(),
        );
        let seen = RefCell::new(Vec::new());
        let outcome = loopback_fetcher().fetch(
            &format!("{base}/charts/1"),
            &|percent| seen.borrow_mut().push(percent),
            &CancelToken::new(),
        );
        assert_eq!(
            outcome,
            FetchOutcome::Bytes {
                payload: b"&title=Xevel".to_vec(),
                extension: String::new(),
            }
        );
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn malformed_url_is_reported_as_data() {
        let fetcher = HttpFetcher::new(&FetchSettings::default()).unwrap();
        let outcome = fetcher.fetch("::not a url::", &|_| {}, &CancelToken::new());
        assert_matches!(outcome, FetchOutcome::Failed(FetchFailure::InvalidUrl(_)));
    }
}
