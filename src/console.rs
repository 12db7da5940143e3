use ck_auth::{AuthError, UserAgent};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::Mutex;
use url::Url;

/// Browser stand-in for a terminal
///
/// Prints the URL to open and reads back the address the browser was
/// redirected to. An empty line means the user closed the browser.
pub struct ConsoleUserAgent<R = BufReader<Stdin>> {
    input: Mutex<R>,
}

impl ConsoleUserAgent {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R> ConsoleUserAgent<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: Mutex::new(input),
        }
    }
}

#[async_trait::async_trait]
impl<R> UserAgent for ConsoleUserAgent<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn open(&self, url: &Url, redirect_uri: &Url) -> Result<Option<Url>, AuthError> {
        eprintln!("Open this URL in your browser:\n\n  {}\n", url);
        eprintln!("Then paste the address starting with {} (empty to cancel):", redirect_uri);

        let mut line = String::new();
        self.input
            .lock()
            .await
            .read_line(&mut line)
            .await
            .map_err(|e| AuthError::Transient(format!("Failed to read redirect URL: {}", e)))?;

        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        Ok(Some(Url::parse(line)?))
    }
}
