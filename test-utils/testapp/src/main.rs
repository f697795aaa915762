use anyhow::{Context, Result};
use clap::Parser;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Demo HTTP service for exercising the process monitor
#[derive(Parser, Debug)]
#[command(name = "testapp")]
#[command(about = "Demo service with a health endpoint", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Seconds after startup to start failing health checks
    #[arg(long)]
    fail_health_after: Option<u64>,

    /// Duration in seconds to run before exiting (omit to run indefinitely)
    #[arg(long)]
    run_duration: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let args = Args::parse();
    info!("Starting testapp with args: {:?}", args);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Test application starting on port {}...", args.port);
    info!("Health check: http://localhost:{}/health", args.port);
    info!("Status check: http://localhost:{}/status", args.port);

    let server = serve(listener, args.fail_health_after);
    match args.run_duration {
        Some(secs) => {
            tokio::select! {
                _ = server => {}
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!("Run duration of {}s elapsed, exiting", secs);
                }
            }
        }
        None => server.await,
    }

    Ok(())
}

async fn serve(listener: TcpListener, fail_after: Option<u64>) {
    let started = Instant::now();

    loop {
        let (stream, _) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Failed to accept connection: {}", e);
                continue;
            }
        };

        let io = TokioIo::new(stream);
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                let response = respond(req.uri().path(), started.elapsed(), fail_after);
                async move { Ok::<_, Infallible>(response) }
            });

            if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

fn respond(path: &str, uptime: Duration, fail_after: Option<u64>) -> Response<Full<Bytes>> {
    match path {
        "/health" => {
            let failing = fail_after.map_or(false, |secs| uptime.as_secs() >= secs);
            if failing {
                debug!("Health check returning: 503 Unhealthy");
                text(StatusCode::SERVICE_UNAVAILABLE, "Unhealthy".to_string())
            } else {
                debug!("Health check returning: 200 OK");
                text(StatusCode::OK, "OK".to_string())
            }
        }
        "/status" => text(
            StatusCode::OK,
            format!(
                "Service is running at {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
            ),
        ),
        _ => text(StatusCode::OK, "Test Application - Process Monitor Demo".to_string()),
    }
}

fn text(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_of(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_ok_before_threshold() {
        let response = respond("/health", Duration::from_secs(4), Some(5));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "OK");
    }

    #[tokio::test]
    async fn test_health_fails_after_threshold() {
        let response = respond("/health", Duration::from_secs(5), Some(5));
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let response = respond("/health", Duration::from_secs(3600), None);
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_and_banner() {
        let status = body_of(respond("/status", Duration::ZERO, None)).await;
        assert!(status.starts_with("Service is running at "));

        let banner = body_of(respond("/anything", Duration::ZERO, None)).await;
        assert_eq!(banner, "Test Application - Process Monitor Demo");
    }
}
