//! 日志和监控模块
//!
//! - `telemetry` feature：基于 tracing-subscriber 的日志初始化
//! - `monitoring` feature：Prometheus 指标
//!
//! # 示例
//!
//! ```rust,ignore
//! use modelgate::config::LogConfig;
//! use modelgate::telemetry::{init_logging, Metrics};
//!
//! init_logging(&LogConfig::default()).unwrap();
//!
//! let metrics = Metrics::new().unwrap();
//! metrics.record_request("model-a");
//! println!("{}", metrics.gather());
//! ```

#[cfg(feature = "telemetry")]
pub use self::logging::init_logging;
#[cfg(feature = "monitoring")]
pub use self::metrics::Metrics;

#[cfg(feature = "telemetry")]
mod logging {
    use crate::config::{LogConfig, LogFormat};
    use crate::error::GateError;
    use tracing_subscriber::{fmt, EnvFilter};

    /// 初始化日志系统
    ///
    /// 优先使用环境变量 `RUST_LOG`，否则使用配置中的级别。
    /// 重复初始化返回 `ConfigError`。
    pub fn init_logging(config: &LogConfig) -> Result<(), GateError> {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.level))
            .map_err(|e| GateError::ConfigError(format!("无效的日志级别 {}: {}", config.level, e)))?;

        let builder = fmt().with_env_filter(filter).with_target(true);

        let result = match config.format {
            LogFormat::Compact => builder.compact().try_init(),
            LogFormat::Pretty => builder.pretty().try_init(),
            LogFormat::Json => builder.json().try_init(),
        };

        result.map_err(|e| GateError::ConfigError(format!("日志系统初始化失败: {}", e)))
    }
}

#[cfg(feature = "monitoring")]
mod metrics {
    use crate::constants::{PERMIT_WAIT_BUCKETS, REQUEST_LATENCY_BUCKETS};
    use prometheus::{
        Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
        TextEncoder,
    };
    use std::time::Duration;
    use tracing::error;

    /// 监控指标
    ///
    /// 所有指标按模型名称打标签，注册在自带的 Registry 中。
    #[derive(Clone)]
    pub struct Metrics {
        /// 发起的请求数
        pub requests_total: IntCounterVec,
        /// 按错误类别统计的失败数
        pub errors_total: IntCounterVec,
        /// 上游请求耗时
        pub request_duration: HistogramVec,
        /// 等待许可的耗时
        pub permit_wait: HistogramVec,
        /// 正在进行的请求数
        pub in_flight: IntGaugeVec,
        registry: Registry,
    }

    impl Metrics {
        /// 创建并注册所有指标
        pub fn new() -> Result<Self, prometheus::Error> {
            let registry = Registry::new();

            let requests_total = IntCounterVec::new(
                Opts::new(
                    "modelgate_requests_total",
                    "Total number of chat completion calls",
                ),
                &["model"],
            )?;
            let errors_total = IntCounterVec::new(
                Opts::new(
                    "modelgate_errors_total",
                    "Total number of failed chat completion calls",
                ),
                &["model", "kind"],
            )?;
            let request_duration = HistogramVec::new(
                HistogramOpts::new(
                    "modelgate_request_duration_seconds",
                    "Upstream round-trip duration in seconds",
                )
                .buckets(REQUEST_LATENCY_BUCKETS.to_vec()),
                &["model"],
            )?;
            let permit_wait = HistogramVec::new(
                HistogramOpts::new(
                    "modelgate_permit_wait_seconds",
                    "Time spent waiting for a concurrency permit in seconds",
                )
                .buckets(PERMIT_WAIT_BUCKETS.to_vec()),
                &["model"],
            )?;
            let in_flight = IntGaugeVec::new(
                Opts::new(
                    "modelgate_in_flight",
                    "Current number of in-flight calls per model",
                ),
                &["model"],
            )?;

            registry.register(Box::new(requests_total.clone()))?;
            registry.register(Box::new(errors_total.clone()))?;
            registry.register(Box::new(request_duration.clone()))?;
            registry.register(Box::new(permit_wait.clone()))?;
            registry.register(Box::new(in_flight.clone()))?;

            Ok(Self {
                requests_total,
                errors_total,
                request_duration,
                permit_wait,
                in_flight,
                registry,
            })
        }

        pub fn record_request(&self, model: &str) {
            self.requests_total.with_label_values(&[model]).inc();
        }

        pub fn record_error(&self, model: &str, kind: &str) {
            self.errors_total.with_label_values(&[model, kind]).inc();
        }

        pub fn record_permit_wait(&self, model: &str, waited: Duration) {
            self.permit_wait
                .with_label_values(&[model])
                .observe(waited.as_secs_f64());
        }

        pub fn record_duration(&self, model: &str, elapsed: Duration) {
            self.request_duration
                .with_label_values(&[model])
                .observe(elapsed.as_secs_f64());
        }

        pub fn set_in_flight(&self, model: &str, value: usize) {
            self.in_flight
                .with_label_values(&[model])
                .set(i64::try_from(value).unwrap_or(i64::MAX));
        }

        /// 收集所有指标并返回 Prometheus 文本格式
        pub fn gather(&self) -> String {
            let encoder = TextEncoder::new();
            let metric_families = self.registry.gather();
            let mut buffer = Vec::new();
            if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
                error!("Failed to encode metrics: {}", e);
                return String::new();
            }
            String::from_utf8(buffer).unwrap_or_default()
        }
    }

}
