use std::time::Duration;

use miette::{IntoDiagnostic, WrapErr};
use tracing::debug;

use crate::result::{bail, Result};

const TIMEOUT: Duration = Duration::from_secs(30);

/// Interface for fetching the preview image of a VOD
pub trait ThumbnailFetcher: Sync {
    /// Download the image at `url`
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Fetches thumbnails over HTTP
pub struct HttpThumbnails {
    agent: ureq::Agent,
}

impl HttpThumbnails {
    pub fn new() -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(TIMEOUT))
            .user_agent(concat!("vodrescue/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            agent: config.into(),
        }
    }
}

impl Default for HttpThumbnails {
    fn default() -> Self {
        Self::new()
    }
}

impl ThumbnailFetcher for HttpThumbnails {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("GET {url}");
        let resp = self
            .agent
            .get(url)
            .call()
            .into_diagnostic()
            .wrap_err_with(|| format!("Could not fetch {url}"))?;

        let status = resp.status();
        if status.as_u16() >= 400 {
            return bail(format!("Fetching {url} failed (status={status})"));
        }
        // A missing content type is given the benefit of the doubt
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("image/")
            .to_owned();
        if !content_type.starts_with("image/") {
            return bail(format!("{url} is not an image ({content_type})"));
        }

        let bytes = resp
            .into_body()
            .read_to_vec()
            .into_diagnostic()
            .wrap_err_with(|| format!("Could not read the body of {url}"))?;
        if bytes.is_empty() {
            return bail(format!("{url} is empty"));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Read, Write},
        net::TcpListener,
        thread,
    };

    use super::*;

    /// Answer a single request with `response` and return the URL to query
    fn serve_once(response: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = vec![];
            let mut buf = [0; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response).unwrap();
        });

        format!("http://{addr}/thumb.jpg")
    }

    #[test]
    fn returns_the_image_bytes() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\nConnection: close\r\n\r\n\xff\xd8\xff\xe0",
        );

        let bytes = HttpThumbnails::new().fetch(&url).unwrap();
        assert_eq!(bytes, b"\xff\xd8\xff\xe0");
    }

    #[test]
    fn error_statuses_are_failures() {
        let url = serve_once(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        assert!(HttpThumbnails::new().fetch(&url).is_err());
    }

    #[test]
    fn non_images_are_failures() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 6\r\nConnection: close\r\n\r\n<html>",
        );
        assert!(HttpThumbnails::new().fetch(&url).is_err());
    }
}
