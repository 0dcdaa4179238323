//! Prometheus gauges for the latest cycle, served as text on `/metrics`.

use std::net::SocketAddr;

use axum::Router;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use eyre::WrapErr;
use fanctl_core::{CycleReport, FanError, ReportSink};
use prometheus::{Encoder, Gauge, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    rpm: Gauge,
    temperature: Gauge,
    duty_cycle: Gauge,
}

impl Metrics {
    pub fn new() -> eyre::Result<Self> {
        let registry = Registry::new();
        let rpm = Gauge::new("fan_controller_rpm", "Current rotations per minute in rpm")?;
        let temperature = Gauge::new(
            "fan_controller_temperature",
            "Current temperature in Celsius degree",
        )?;
        let duty_cycle = Gauge::new(
            "fan_controller_duty_cycle",
            "Current duty cycle in percent",
        )?;
        registry.register(Box::new(rpm.clone()))?;
        registry.register(Box::new(temperature.clone()))?;
        registry.register(Box::new(duty_cycle.clone()))?;
        Ok(Self {
            registry,
            rpm,
            temperature,
            duty_cycle,
        })
    }

    pub fn update(&self, report: &CycleReport) {
        self.temperature.set(report.temperature);
        self.duty_cycle.set(f64::from(report.duty_cycle.percent));
        self.rpm.set(f64::from(report.rpm));
    }

    /// Text exposition format.
    pub fn render(&self) -> eyre::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve `/metrics` from a background thread for the rest of the process.
    ///
    /// The socket is bound before returning so bind errors reach the caller.
    pub fn serve(&self, addr: SocketAddr) -> eyre::Result<SocketAddr> {
        let listener = std::net::TcpListener::bind(addr)
            .wrap_err_with(|| format!("bind metrics server on {addr}"))?;
        listener.set_nonblocking(true)?;
        let local = listener.local_addr()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .build()
            .wrap_err("build metrics runtime")?;
        let app = Router::new()
            .route("/metrics", get(scrape))
            .route("/", get(scrape))
            .with_state(self.clone());

        std::thread::Builder::new()
            .name("fanctl-metrics".into())
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = match tokio::net::TcpListener::from_std(listener) {
                        Ok(l) => l,
                        Err(e) => {
                            tracing::warn!(error = %e, "metrics listener unusable");
                            return;
                        }
                    };
                    if let Err(e) = axum::serve(listener, app).await {
                        tracing::warn!(error = %e, "metrics server stopped");
                    }
                });
            })
            .wrap_err("spawn metrics server")?;
        tracing::info!(%local, "prometheus exporter listening");
        Ok(local)
    }
}

async fn scrape(State(metrics): State<Metrics>) -> Response {
    match metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::debug!(error = %e, "metrics render failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

impl ReportSink for Metrics {
    fn publish(&mut self, report: &CycleReport) -> Result<(), FanError> {
        self.update(report);
        Ok(())
    }
}
