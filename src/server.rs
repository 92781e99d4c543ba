//! Per-instance TCP accept loop with HTTP/1.1 + HTTP/2 auto-detection over
//! a plain or TLS-terminating listener.

use std::convert::Infallible;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use gateway_log::LogWriterRegistry;
use gateway_proxy::pipeline::{self, InstanceRuntime};
use http::{Request, Response};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tls_listener::{AsyncTls, TlsListener};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use crate::metrics::{ErrorLabels, GatewayMetrics, RequestLabels};

#[derive(Clone)]
struct RustlsAcceptor(TlsAcceptor);

impl AsyncTls<TcpStream> for RustlsAcceptor {
	type Stream = tokio_rustls::server::TlsStream<TcpStream>;
	type Error = io::Error;
	type AcceptFuture = tokio_rustls::Accept<TcpStream>;

	fn accept(&self, stream: TcpStream) -> Self::AcceptFuture {
		self.0.accept(stream)
	}
}

fn is_connection_error(e: &io::Error) -> bool {
	matches!(e.kind(), io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset)
}

/// Everything one bound instance listener needs to turn an accepted
/// connection into pipeline calls.
pub struct Listener {
	pub runtime: Arc<InstanceRuntime>,
	pub log_writers: Arc<LogWriterRegistry>,
	pub metrics: Arc<GatewayMetrics>,
	pub tenant_id: String,
	pub instance_id: String,
	pub tls_acceptor: Option<TlsAcceptor>,
}

impl Listener {
	pub async fn serve(self: Arc<Self>, addr: String, shutdown: CancellationToken) -> io::Result<()> {
		let tcp = TcpListener::bind(&addr).await?;
		tracing::info!(%addr, tenant_id = %self.tenant_id, instance_id = %self.instance_id, "instance listening");

		match self.tls_acceptor.clone() {
			Some(acceptor) => self.serve_tls(tcp, acceptor, shutdown).await,
			None => self.serve_plain(tcp, shutdown).await,
		}
	}

	async fn serve_plain(self: Arc<Self>, tcp: TcpListener, shutdown: CancellationToken) -> io::Result<()> {
		loop {
			tokio::select! {
				accepted = tcp.accept() => {
					match accepted {
						Ok((stream, peer)) => self.clone().spawn_connection(stream, peer, shutdown.child_token()),
						Err(e) if is_connection_error(&e) => continue,
						Err(e) => { tracing::warn!(error = %e, "accept failed"); continue; },
					}
				},
				_ = shutdown.cancelled() => return Ok(()),
			}
		}
	}

	async fn serve_tls(self: Arc<Self>, tcp: TcpListener, acceptor: TlsAcceptor, shutdown: CancellationToken) -> io::Result<()> {
		let mut tls_listener = TlsListener::new(RustlsAcceptor(acceptor), tcp);
		loop {
			tokio::select! {
				accepted = TlsListener::accept(&mut tls_listener) => {
					match accepted {
						Ok((stream, peer)) => self.clone().spawn_connection(stream, peer, shutdown.child_token()),
						Err(tls_listener::Error::ListenerError(e)) if !is_connection_error(&e) => {
							tracing::warn!(error = %e, "tls accept failed");
						},
						Err(_) => continue,
					}
				},
				_ = shutdown.cancelled() => return Ok(()),
			}
		}
	}

	fn spawn_connection<I>(self: Arc<Self>, stream: I, peer: SocketAddr, shutdown: CancellationToken)
	where
		I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
	{
		tokio::spawn(async move {
			self.run_conn(stream, peer.ip(), shutdown).await;
		});
	}

	async fn run_conn<I>(&self, io: I, peer_ip: IpAddr, shutdown: CancellationToken)
	where
		I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
	{
		let runtime = self.runtime.clone();
		let log_writers = self.log_writers.clone();
		let metrics = self.metrics.clone();
		let tenant_id = self.tenant_id.clone();
		let instance_id = self.instance_id.clone();

		let service = hyper::service::service_fn(move |req: Request<hyper::body::Incoming>| {
			let runtime = runtime.clone();
			let log_writers = log_writers.clone();
			let metrics = metrics.clone();
			let tenant_id = tenant_id.clone();
			let instance_id = instance_id.clone();
			async move {
				let response = handle_request(&runtime, &log_writers, &metrics, &tenant_id, &instance_id, peer_ip, req).await;
				Ok::<_, Infallible>(response)
			}
		});

		let builder = auto::Builder::new(TokioExecutor::new());
		let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), service);
		tokio::select! {
			result = conn => {
				if let Err(e) = result {
					tracing::debug!(error = %e, "connection closed with error");
				}
			},
			_ = shutdown.cancelled() => {},
		}
	}
}

async fn handle_request(
	runtime: &InstanceRuntime,
	log_writers: &LogWriterRegistry,
	metrics: &GatewayMetrics,
	tenant_id: &str,
	instance_id: &str,
	peer_ip: IpAddr,
	req: Request<hyper::body::Incoming>,
) -> Response<Full<Bytes>> {
	let (parts, incoming) = req.into_parts();
	let body = incoming.collect().await.map(|c| c.to_bytes()).unwrap_or_default();
	let req = Request::from_parts(parts, Full::new(body));

	let outcome = pipeline::handle(runtime, tenant_id, instance_id, peer_ip, req).await;

	let status_class = match outcome.response.status().as_u16() {
		200..=299 => "2xx",
		300..=399 => "3xx",
		400..=499 => "4xx",
		500..=599 => "5xx",
		_ => "other",
	};
	metrics
		.requests_total
		.get_or_create(&RequestLabels { tenant_id: tenant_id.to_string(), instance_id: instance_id.to_string(), status_class: status_class.to_string() })
		.inc();
	if let Some(error_code) = outcome.access_log.error_code.clone() {
		metrics
			.errors_total
			.get_or_create(&ErrorLabels { tenant_id: tenant_id.to_string(), instance_id: instance_id.to_string(), error_code })
			.inc();
	}

	let log_config = runtime.snapshot.load().log_config.clone();
	match log_writers.get_or_create(instance_id, &log_config) {
		Ok(writer) => {
			let _ = writer.write(outcome.access_log).await;
			if !outcome.backend_traces.is_empty() {
				let _ = writer.batch_write_backend_trace(outcome.backend_traces).await;
			}
		},
		Err(e) => tracing::warn!(error = %e, instance_id, "failed to acquire log writer"),
	}

	outcome.response
}
