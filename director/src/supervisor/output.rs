use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::{info, warn};

/// Which pipe of the backend a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputStream::Stdout => write!(f, "stdout"),
            OutputStream::Stderr => write!(f, "stderr"),
        }
    }
}

pub fn contains_sentinel(line: &str, sentinels: &[String]) -> bool {
    sentinels.iter().any(|s| !s.is_empty() && line.contains(s.as_str()))
}

/// Re-emit every backend line as a tracing event and call `on_sentinel`
/// for each line carrying a startup sentinel. Returns at EOF.
///
/// Lines are decoded lossily; the backend is not guaranteed to print UTF-8.
pub async fn watch_output<R, F>(reader: R, stream: OutputStream, sentinels: &[String], mut on_sentinel: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end();
                match stream {
                    OutputStream::Stdout => info!(%stream, "backend: {line}"),
                    OutputStream::Stderr => warn!(%stream, "backend: {line}"),
                }
                if contains_sentinel(line, sentinels) {
                    info!(%stream, "backend startup sentinel seen");
                    on_sentinel();
                }
            }
            Err(e) => {
                warn!(%stream, error = %e, "backend output read failed");
                break;
            }
        }
    }
}
