use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Datelike, Local, NaiveDateTime, Timelike};
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::core::format::fixed2;
use crate::core::{FormSession, LoanConfiguration, Variant, quote_for};
use crate::error::{FormError, SubmitError};
use crate::storage::FlagStore;

/// The collector expects JSON text under a plain-text content type.
pub const PAYLOAD_CONTENT_TYPE: &str = "text/plain;charset=utf-8";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Final payload of one wizard flow. Built once by the form session and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionRecord {
    sum_cred: String,
    srok_kredita: u32,
    platezh_mes: String,
    chosen_option: &'static str,
    #[serde(skip)]
    variant: String,
}

impl SubmissionRecord {
    /// Under [`Variant::Collateral`] the submitted term is always the
    /// option's longest term, whatever the configuration holds.
    pub fn new(config: &LoanConfiguration, variant: Variant, variant_id: &str) -> Self {
        let term_years = match variant {
            Variant::Collateral => variant.term_bounds(config.collateral).max,
            Variant::FixedTerm => config.term_years,
        };
        let quote = quote_for(config.collateral.option(), config.principal, term_years);
        Self {
            sum_cred: fixed2(config.principal),
            srok_kredita: term_years,
            platezh_mes: fixed2(quote.monthly_payment),
            chosen_option: config.collateral.analytics_code(),
            variant: variant_id.to_string(),
        }
    }

    pub fn principal(&self) -> &str {
        &self.sum_cred
    }

    pub fn term_years(&self) -> u32 {
        self.srok_kredita
    }

    pub fn monthly_payment(&self) -> &str {
        &self.platezh_mes
    }

    pub fn chosen_option(&self) -> &'static str {
        self.chosen_option
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }
}

#[derive(Debug, Serialize)]
struct WireBody<'a> {
    date: String,
    #[serde(flatten)]
    record: &'a SubmissionRecord,
    variant: &'a str,
}

/// Local timestamp without zero padding, e.g. `2024-3-7 9:5:0`.
pub fn collector_timestamp(at: NaiveDateTime) -> String {
    format!(
        "{}-{}-{} {}:{}:{}",
        at.year(),
        at.month(),
        at.day(),
        at.hour(),
        at.minute(),
        at.second()
    )
}

pub fn encode_body(record: &SubmissionRecord, at: NaiveDateTime) -> Result<String, SubmitError> {
    let body = WireBody {
        date: collector_timestamp(at),
        record,
        variant: record.variant(),
    };
    Ok(serde_json::to_string(&body)?)
}

#[async_trait]
pub trait Collector: Send + Sync {
    async fn send(&self, record: &SubmissionRecord) -> Result<(), SubmitError>;
}

/// Posts records to the analytics collector over HTTP.
#[derive(Debug, Clone)]
pub struct HttpCollector {
    client: reqwest::Client,
    url: String,
}

impl HttpCollector {
    pub fn new(url: impl Into<String>) -> Result<Self, SubmitError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Collector for HttpCollector {
    async fn send(&self, record: &SubmissionRecord) -> Result<(), SubmitError> {
        let body = encode_body(record, Local::now().naive_local())?;
        let response = self
            .client
            .post(&self.url)
            .header(CONTENT_TYPE, PAYLOAD_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SubmitError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Stand-in collector for runs without a collector URL.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogCollector;

#[async_trait]
impl Collector for LogCollector {
    async fn send(&self, record: &SubmissionRecord) -> Result<(), SubmitError> {
        let body = encode_body(record, Local::now().naive_local())?;
        info!(%body, "analytics payload (no collector configured)");
        Ok(())
    }
}

/// Starts the submission of the session's review step as a detached task.
///
/// The guard runs synchronously, so a rejected submit never spawns. The task
/// outcome only drives bookkeeping: a delivery failure is logged and the
/// session still moves to the thank-you view with the flag persisted.
pub async fn spawn_submission(
    session: Arc<Mutex<FormSession>>,
    collector: Arc<dyn Collector>,
    flags: Arc<dyn FlagStore>,
) -> Result<JoinHandle<()>, FormError> {
    let record = session.lock().await.begin_submit()?;

    Ok(tokio::spawn(async move {
        match collector.send(&record).await {
            Ok(()) => info!(collateral = record.chosen_option(), "submission delivered"),
            Err(e) => warn!(error = %e, "submission delivery failed, continuing"),
        }
        let mut form = session.lock().await;
        form.complete_submission(flags.as_ref());
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CollateralChoice, ViewStep};
    use crate::storage::{MemoryFlagStore, SHOW_THANKS_KEY};
    use axum::{Router, body::Bytes, extract::State, http::HeaderMap, routing::post};
    use chrono::NaiveDate;
    use std::sync::Mutex as StdMutex;
    use tokio::net::TcpListener;

    fn sample_config() -> LoanConfiguration {
        LoanConfiguration {
            principal: 1_000_000.0,
            term_years: 5,
            collateral: CollateralChoice::None,
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 7)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .expect("valid timestamp")
    }

    #[derive(Default)]
    struct RecordingCollector {
        sent: StdMutex<Vec<SubmissionRecord>>,
    }

    #[async_trait]
    impl Collector for RecordingCollector {
        async fn send(&self, record: &SubmissionRecord) -> Result<(), SubmitError> {
            self.sent.lock().expect("lock").push(record.clone());
            Ok(())
        }
    }

    struct FailingCollector;

    #[async_trait]
    impl Collector for FailingCollector {
        async fn send(&self, _record: &SubmissionRecord) -> Result<(), SubmitError> {
            Err(SubmitError::Status(502))
        }
    }

    fn reviewing_session() -> Arc<Mutex<FormSession>> {
        let mut form = FormSession::new(Variant::Collateral, "ghk_5478_2", false);
        form.proceed().expect("configuring");
        Arc::new(Mutex::new(form))
    }

    #[test]
    fn record_carries_fixed_decimal_strings() {
        let record = SubmissionRecord::new(&sample_config(), Variant::Collateral, "ghk_5478_2");
        assert_eq!(record.principal(), "1000000.00");
        assert_eq!(record.term_years(), 5);
        assert_eq!(record.monthly_payment(), "34789.14");
        assert_eq!(record.chosen_option(), "nothing");
    }

    #[test]
    fn record_uses_selected_option_rate_and_term() {
        let config = LoanConfiguration {
            principal: 1_000_000.0,
            term_years: 15,
            collateral: CollateralChoice::RealEstate,
        };
        let record = SubmissionRecord::new(&config, Variant::Collateral, "v");
        assert_eq!(record.chosen_option(), "property");
        assert_eq!(record.term_years(), 15);
        assert_eq!(record.monthly_payment(), "23761.79");
    }

    #[test]
    fn collateral_variant_submits_option_maximum_term() {
        let config = LoanConfiguration {
            principal: 1_000_000.0,
            term_years: 2,
            collateral: CollateralChoice::RealEstate,
        };
        let record = SubmissionRecord::new(&config, Variant::Collateral, "v");
        assert_eq!(record.term_years(), 15);
        assert_eq!(record.monthly_payment(), "23761.79");

        let record = SubmissionRecord::new(&config, Variant::FixedTerm, "v");
        assert_eq!(record.term_years(), 2);
    }

    #[test]
    fn timestamp_is_not_zero_padded() {
        assert_eq!(collector_timestamp(at(9, 5, 0)), "2024-3-7 9:5:0");
        assert_eq!(collector_timestamp(at(23, 59, 31)), "2024-3-7 23:59:31");
    }

    #[test]
    fn wire_body_keeps_collector_field_order() {
        let record = SubmissionRecord::new(&sample_config(), Variant::Collateral, "ghk_5478_2");
        let body = encode_body(&record, at(9, 5, 0)).expect("encodes");
        assert_eq!(
            body,
            r#"{"date":"2024-3-7 9:5:0","sum_cred":"1000000.00","srok_kredita":5,"platezh_mes":"34789.14","chosen_option":"nothing","variant":"ghk_5478_2"}"#
        );
    }

    #[tokio::test]
    async fn successful_submission_shows_thanks_and_sets_flag() {
        let session = reviewing_session();
        let collector = Arc::new(RecordingCollector::default());
        let flags = Arc::new(MemoryFlagStore::new());

        let handle = spawn_submission(session.clone(), collector.clone(), flags.clone())
            .await
            .expect("guard passes");
        handle.await.expect("task completes");

        let form = session.lock().await;
        assert_eq!(form.view_step(), ViewStep::Thanks);
        assert!(!form.is_loading());
        assert!(flags.get(SHOW_THANKS_KEY).expect("readable"));
        assert_eq!(collector.sent.lock().expect("lock").len(), 1);
    }

    // Delivery failures are dropped on purpose: the visitor still sees the
    // thank-you view and the record is lost.
    #[tokio::test]
    async fn failed_submission_is_swallowed_and_still_shows_thanks() {
        let session = reviewing_session();
        let flags = Arc::new(MemoryFlagStore::new());

        let handle = spawn_submission(session.clone(), Arc::new(FailingCollector), flags.clone())
            .await
            .expect("guard passes");
        handle.await.expect("task completes");

        let form = session.lock().await;
        assert_eq!(form.view_step(), ViewStep::Thanks);
        assert!(flags.get(SHOW_THANKS_KEY).expect("readable"));
    }

    #[tokio::test]
    async fn overlapping_submit_is_rejected_while_loading() {
        let session = reviewing_session();
        let collector = Arc::new(RecordingCollector::default());
        let flags = Arc::new(MemoryFlagStore::new());

        let first = spawn_submission(session.clone(), collector.clone(), flags.clone())
            .await
            .expect("guard passes");
        let second = spawn_submission(session.clone(), collector.clone(), flags.clone()).await;
        assert!(matches!(
            second.err(),
            Some(FormError::Busy) | Some(FormError::AlreadySubmitted)
        ));
        first.await.expect("task completes");

        let third = spawn_submission(session, collector.clone(), flags).await;
        assert_eq!(third.err(), Some(FormError::AlreadySubmitted));
        assert_eq!(collector.sent.lock().expect("lock").len(), 1);
    }

    #[derive(Clone, Default)]
    struct Captured {
        requests: Arc<StdMutex<Vec<(String, String)>>>,
    }

    async fn capture(State(captured): State<Captured>, headers: HeaderMap, body: Bytes) {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let body = String::from_utf8_lossy(&body).to_string();
        captured.requests.lock().expect("lock").push((content_type, body));
    }

    #[tokio::test]
    async fn http_collector_posts_json_text_as_plain_text() {
        let captured = Captured::default();
        let app = Router::new()
            .route("/collect", post(capture))
            .with_state(captured.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let collector = HttpCollector::new(format!("http://{addr}/collect")).expect("client");
        let record = SubmissionRecord::new(&sample_config(), Variant::Collateral, "ghk_5478_2");
        collector.send(&record).await.expect("delivered");

        let requests = captured.requests.lock().expect("lock").clone();
        assert_eq!(requests.len(), 1);
        let (content_type, body) = &requests[0];
        assert_eq!(content_type, PAYLOAD_CONTENT_TYPE);
        let json: serde_json::Value = serde_json::from_str(body).expect("json text");
        assert_eq!(json["sum_cred"], "1000000.00");
        assert_eq!(json["srok_kredita"], 5);
        assert_eq!(json["chosen_option"], "nothing");
        assert_eq!(json["variant"], "ghk_5478_2");
        assert!(json["date"].is_string());
    }

    #[tokio::test]
    async fn http_collector_reports_unreachable_collector() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let collector = HttpCollector::new(format!("http://{addr}/collect")).expect("client");
        let record = SubmissionRecord::new(&sample_config(), Variant::Collateral, "v");
        let err = collector.send(&record).await.expect_err("nothing listens");
        assert!(matches!(err, SubmitError::Transport(_)));
    }
}
