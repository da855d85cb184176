//! Cruz del Sur status lookup.
//!
//! The tracking form is guarded by an image captcha, so each query is a small protocol:
//! fill the form, screenshot and crop the captcha, have the solver read it, submit,
//! then pick the most recent dated event out of the result tables. Any failure sends
//! the protocol back to the start with a fresh browser session, a bounded number of
//! times.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{info, warn};

use crate::browser::{close_quietly, BrowserLauncher, BrowserSession};
use crate::captcha::{await_answer, crop_captcha, CaptchaSolver};
use crate::config::{CaptchaRegion, CruzDelSurConfig, SolverConfig};
use crate::error::{Result, TrackerError};
use crate::lookup::StatusLookup;
use crate::metrics::MetricsCollector;
use crate::models::Carrier;
use crate::poll::PollPolicy;

const TRACKING_INPUT_ID: &str = "nrodoc";
const CAPTCHA_INPUT_ID: &str = "captcha";
const SUBMIT_LABEL: &str = "CONSULTAR";
const EVENT_TIME_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Furthest step an attempt reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Init,
    FormFilled,
    CaptchaCaptured,
    CaptchaSubmittedToSolver,
    CaptchaSolved,
    QuerySubmitted,
    ResultParsed,
}

/// Final result of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `"<status> [DD/MM/YYYY HH:MM]"` of the most recent event
    Status(String),
    /// Every attempt failed
    GaveUp,
}

/// A failed attempt and the stage it had reached.
#[derive(Debug)]
pub struct AttemptFailure {
    pub stage: Stage,
    pub error: TrackerError,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed after {:?}: {}", self.stage, self.error)
    }
}

#[allow(clippy::expect_used)]
fn event_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{2}/\d{2}/\d{4} \d{2}:\d{2})\s+(.*)$").expect("event pattern is valid")
    })
}

/// Dated events in a block of table text, one per matching line.
///
/// Lines whose date does not exist on the calendar are skipped.
pub fn parse_date_lines(text: &str) -> Vec<(NaiveDateTime, String)> {
    text.lines()
        .filter_map(|line| {
            let caps = event_line().captures(line.trim())?;
            let when = NaiveDateTime::parse_from_str(&caps[1], EVENT_TIME_FORMAT).ok()?;
            Some((when, caps[2].trim().to_string()))
        })
        .collect()
}

/// Latest event; the earliest-listed one wins a tie.
pub fn most_recent(events: impl IntoIterator<Item = (NaiveDateTime, String)>) -> Option<(NaiveDateTime, String)> {
    events.into_iter().fold(None, |best, event| match best {
        Some(ref b) if event.0 <= b.0 => best,
        _ => Some(event),
    })
}

/// Render an event the way it is stored in the status column.
pub fn format_event(when: NaiveDateTime, status: &str) -> String {
    format!("{status} [{}]", when.format(EVENT_TIME_FORMAT))
}

/// Cruz del Sur tracking through browser plus captcha solver.
pub struct CruzDelSurLookup {
    launcher: Arc<dyn BrowserLauncher>,
    solver: Arc<dyn CaptchaSolver>,
    tracking_url: String,
    max_attempts: u32,
    retry_backoff: Duration,
    form_timeout: Duration,
    settle: Duration,
    captcha_region: CaptchaRegion,
    solver_policy: PollPolicy,
    metrics: MetricsCollector,
}

impl CruzDelSurLookup {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        solver: Arc<dyn CaptchaSolver>,
        config: &CruzDelSurConfig,
        solver_config: &SolverConfig,
    ) -> Self {
        Self {
            launcher,
            solver,
            tracking_url: config.tracking_url.clone(),
            max_attempts: config.max_attempts.max(1),
            retry_backoff: Duration::from_secs(config.retry_backoff_secs),
            form_timeout: Duration::from_secs(config.form_timeout_secs),
            settle: Duration::from_secs(config.settle_secs),
            captcha_region: config.captcha_region,
            solver_policy: PollPolicy::new(
                Duration::from_secs(solver_config.poll_interval_secs),
                solver_config.max_polls,
            ),
            metrics: MetricsCollector::default(),
        }
    }

    /// Override the solver polling policy.
    #[must_use]
    pub fn with_solver_policy(mut self, policy: PollPolicy) -> Self {
        self.solver_policy = policy;
        self
    }

    /// Override the settle and backoff delays.
    #[must_use]
    pub fn with_delays(mut self, settle: Duration, retry_backoff: Duration) -> Self {
        self.settle = settle;
        self.retry_backoff = retry_backoff;
        self
    }

    /// Run the protocol until it yields a status or the attempts run out.
    pub async fn query(&self, tracking_number: &str) -> Outcome {
        for attempt in 1..=self.max_attempts {
            info!(
                "Querying Cruz del Sur for {tracking_number} (attempt {attempt}/{})",
                self.max_attempts
            );
            match self.run_attempt(tracking_number).await {
                Ok(status) => return Outcome::Status(status),
                Err(failure) => warn!("Cruz del Sur attempt {attempt} {failure}"),
            }
            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_backoff).await;
            }
        }
        warn!(
            "Cruz del Sur query for {tracking_number} gave up after {} attempts",
            self.max_attempts
        );
        Outcome::GaveUp
    }

    async fn run_attempt(&self, tracking_number: &str) -> std::result::Result<String, AttemptFailure> {
        let session = self.launcher.launch().await.map_err(|error| AttemptFailure {
            stage: Stage::Init,
            error,
        })?;

        let mut stage = Stage::Init;
        let result = self.attempt(session.as_ref(), tracking_number, &mut stage).await;
        close_quietly(session).await;

        result.map_err(|error| AttemptFailure { stage, error })
    }

    async fn attempt(&self, session: &dyn BrowserSession, tracking_number: &str, stage: &mut Stage) -> Result<String> {
        session.goto(&self.tracking_url).await?;
        session
            .fill_by_id(TRACKING_INPUT_ID, tracking_number, self.form_timeout)
            .await?;
        *stage = Stage::FormFilled;

        let screenshot = session.screenshot_png().await?;
        let captcha = crop_captcha(&screenshot, self.captcha_region)?;
        *stage = Stage::CaptchaCaptured;

        let job_id = self.solver.submit(captcha).await?;
        *stage = Stage::CaptchaSubmittedToSolver;

        let answer = await_answer(self.solver.as_ref(), &job_id, self.solver_policy).await;
        self.metrics
            .record_captcha_attempt(matches!(answer, Ok(Some(_))));
        let answer = answer?.ok_or_else(|| TrackerError::Solver("captcha not solved in time".to_string()))?;
        *stage = Stage::CaptchaSolved;

        session
            .fill_by_id(CAPTCHA_INPUT_ID, &answer, self.form_timeout)
            .await?;
        if !session.click_labelled(SUBMIT_LABEL).await? {
            return Err(TrackerError::Browser(format!("no {SUBMIT_LABEL} control on the page")));
        }
        *stage = Stage::QuerySubmitted;

        tokio::time::sleep(self.settle).await;
        let tables = session.table_texts().await?;
        let (when, status) = most_recent(tables.iter().flat_map(|t| parse_date_lines(t)))
            .ok_or_else(|| TrackerError::Other("no dated events in the result tables".to_string()))?;
        *stage = Stage::ResultParsed;

        Ok(format_event(when, &status))
    }
}

#[async_trait]
impl StatusLookup for CruzDelSurLookup {
    fn carrier(&self) -> Carrier {
        Carrier::CruzDelSur
    }

    async fn lookup(&self, tracking_number: &str) -> Option<String> {
        match self.query(tracking_number).await {
            Outcome::Status(status) => Some(status),
            Outcome::GaveUp => None,
        }
    }
}
