use anyhow::{bail, Result};
use clap::Args;

pub mod delete;
pub mod search;

/// Arguments selecting a set of chunks in the GeoRocket data store
#[derive(Args, Debug)]
pub struct StoreSelection {
    /// Absolute path to the layer containing the chunks (`/` is the root
    /// layer)
    #[arg(short, long)]
    pub layer: Option<String>,

    /// Query terms selecting the chunks
    pub query: Vec<String>,
}

impl StoreSelection {
    /// The query terms joined by spaces or [`None`] if there are none
    fn query(&self) -> Option<String> {
        let query = self.query.join(" ");
        if query.trim().is_empty() {
            None
        } else {
            Some(query)
        }
    }

    /// Build the path and query string of a request to the `/store` endpoint
    pub fn store_path(&self, extra: &[(&str, &str)]) -> Result<String> {
        let mut path = "/store/".to_string();

        if let Some(layer) = &self.layer {
            if layer.is_empty() {
                bail!("Layer must not be empty");
            }
            let layer = layer.trim_matches('/');
            if !layer.is_empty() {
                path.push_str(
                    &layer
                        .split('/')
                        .map(urlencoding::encode)
                        .collect::<Vec<_>>()
                        .join("/"),
                );
                path.push('/');
            }
        }

        let mut params = Vec::new();
        if let Some(query) = self.query() {
            params.push(format!("search={}", urlencoding::encode(&query)));
        }
        for (key, value) in extra {
            params.push(format!("{}={}", key, urlencoding::encode(value)));
        }
        if !params.is_empty() {
            path.push('?');
            path.push_str(&params.join("&"));
        }

        Ok(path)
    }

    /// Fail if neither a layer nor a query was given
    pub fn ensure_not_empty(&self) -> Result<()> {
        if self.layer.is_none() && self.query().is_none() {
            bail!("No search query and no layer given. Do you really wish to select all chunks? Use `-l /' to select the root layer.");
        }
        Ok(())
    }
}


/// A minimal HTTP server that answers exactly one request
#[cfg(test)]
pub(crate) mod test_server {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
        task::JoinHandle,
    };

    /// Start the server. Returns its base URL and a handle that resolves to
    /// the request line it received.
    pub async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();

            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();

            let request = String::from_utf8(request).unwrap();
            request.lines().next().unwrap_or_default().to_string()
        });

        (format!("http://{addr}"), handle)
    }
}
