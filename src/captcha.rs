//! Captcha capture and the remote solving service.
//!
//! The solver speaks the 2Captcha text protocol: an upload answers `OK|<job id>`,
//! and polling the job answers `CAPCHA_NOT_READY` until it becomes `OK|<text>`.

use async_trait::async_trait;
use image::ImageFormat;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::io::Cursor;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{CaptchaRegion, SolverConfig};
use crate::error::{Result, TrackerError};
use crate::poll::{poll_until, PollPolicy, Probe};

const NOT_READY: &str = "CAPCHA_NOT_READY";

/// State of a submitted captcha job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverPoll {
    Pending,
    Solved(String),
}

/// Remote captcha-solving service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CaptchaSolver: Send + Sync {
    /// Upload a PNG and return the job id.
    async fn submit(&self, image_png: Vec<u8>) -> Result<String>;

    /// Ask whether job `job_id` has an answer yet.
    async fn check(&self, job_id: &str) -> Result<SolverPoll>;
}

fn ok_payload(body: &str) -> Option<&str> {
    body.trim().split_once("OK|").map(|(_, rest)| rest.trim())
}

/// Parse the upload response into a job id.
pub fn parse_submit_response(body: &str) -> Result<String> {
    match ok_payload(body) {
        Some(id) if !id.is_empty() => Ok(id.to_string()),
        _ => Err(TrackerError::Solver(format!("upload rejected: {}", body.trim()))),
    }
}

/// Parse a poll response.
pub fn parse_poll_response(body: &str) -> Result<SolverPoll> {
    if body.trim() == NOT_READY {
        return Ok(SolverPoll::Pending);
    }
    match ok_payload(body) {
        Some(text) => Ok(SolverPoll::Solved(text.to_string())),
        None => Err(TrackerError::Solver(body.trim().to_string())),
    }
}

/// Submit `image_png` and wait for its answer.
pub async fn solve(solver: &dyn CaptchaSolver, image_png: Vec<u8>, policy: PollPolicy) -> Result<Option<String>> {
    let job_id = solver.submit(image_png).await?;
    debug!("Captcha submitted as job {job_id}");
    await_answer(solver, &job_id, policy).await
}

/// Poll job `job_id` until it is solved.
///
/// The first poll happens one interval after the call. Returns `Ok(None)` when the
/// policy runs out while the job is still pending.
pub async fn await_answer(solver: &dyn CaptchaSolver, job_id: &str, policy: PollPolicy) -> Result<Option<String>> {
    let answer = poll_until(policy.delayed(), |_| async move {
        Ok::<_, TrackerError>(match solver.check(job_id).await? {
            SolverPoll::Pending => Probe::Pending,
            SolverPoll::Solved(text) => Probe::Ready(text),
        })
    })
    .await?;

    if answer.is_none() {
        warn!("Captcha job {job_id} not solved after {} polls", policy.max_attempts);
    }
    Ok(answer)
}

/// Cut the captcha out of a full-page screenshot and re-encode it as PNG.
pub fn crop_captcha(screenshot_png: &[u8], region: CaptchaRegion) -> Result<Vec<u8>> {
    let screenshot = image::load_from_memory(screenshot_png)?;
    let fits = u64::from(region.x) + u64::from(region.width) <= u64::from(screenshot.width())
        && u64::from(region.y) + u64::from(region.height) <= u64::from(screenshot.height());
    if !fits {
        return Err(TrackerError::Other(format!(
            "captcha region {region:?} lies outside the {}x{} screenshot",
            screenshot.width(),
            screenshot.height()
        )));
    }

    let captcha = screenshot.crop_imm(region.x, region.y, region.width, region.height);
    let mut png = Vec::new();
    captcha.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(png)
}

/// HTTP client for a 2Captcha-compatible service.
pub struct TwoCaptchaClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl TwoCaptchaClient {
    pub fn new(client: Client, config: &SolverConfig, api_key: String) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

#[async_trait]
impl CaptchaSolver for TwoCaptchaClient {
    async fn submit(&self, image_png: Vec<u8>) -> Result<String> {
        let file = Part::bytes(image_png)
            .file_name("captcha.png")
            .mime_str("image/png")?;
        let form = Form::new()
            .part("file", file)
            .text("key", self.api_key.clone())
            .text("method", "post");

        let body = self
            .client
            .post(format!("{}/in.php", self.base_url))
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await?
            .text()
            .await?;
        parse_submit_response(&body)
    }

    async fn check(&self, job_id: &str) -> Result<SolverPoll> {
        let body = self
            .client
            .get(format!("{}/res.php", self.base_url))
            .query(&[("key", self.api_key.as_str()), ("action", "get"), ("id", job_id)])
            .timeout(self.timeout)
            .send()
            .await?
            .text()
            .await?;
        parse_poll_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, RgbImage};
    use mockall::Sequence;

    fn png_of(width: u32, height: u32) -> Vec<u8> {
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .expect("encode");
        png
    }

    #[test]
    fn test_parse_submit_response() {
        assert_eq!(parse_submit_response("OK|7331").expect("id"), "7331");
        assert!(matches!(
            parse_submit_response("ERROR_ZERO_BALANCE"),
            Err(TrackerError::Solver(_))
        ));
        assert!(parse_submit_response("OK|").is_err());
    }

    #[test]
    fn test_parse_poll_response() {
        assert_eq!(parse_poll_response("CAPCHA_NOT_READY").expect("poll"), SolverPoll::Pending);
        assert_eq!(
            parse_poll_response("OK|x7k2p").expect("poll"),
            SolverPoll::Solved("x7k2p".to_string())
        );
        assert!(parse_poll_response("ERROR_CAPTCHA_UNSOLVABLE").is_err());
    }

    #[test]
    fn test_crop_captcha_region() {
        let region = CaptchaRegion { x: 563, y: 409, width: 138, height: 62 };
        let cropped = crop_captcha(&png_of(1920, 1080), region).expect("crop");
        let decoded = image::load_from_memory(&cropped).expect("decode");
        assert_eq!(decoded.dimensions(), (138, 62));
    }

    #[test]
    fn test_crop_outside_screenshot_fails() {
        let region = CaptchaRegion { x: 563, y: 409, width: 138, height: 62 };
        assert!(crop_captcha(&png_of(600, 400), region).is_err());
    }

    #[tokio::test]
    async fn test_solve_polls_until_ready() {
        let mut solver = MockCaptchaSolver::new();
        let mut seq = Sequence::new();
        solver
            .expect_submit()
            .times(1)
            .returning(|_| Ok("42".to_string()));
        solver
            .expect_check()
            .withf(|id| id == "42")
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(SolverPoll::Pending));
        solver
            .expect_check()
            .withf(|id| id == "42")
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(SolverPoll::Solved("abcd".to_string())));

        let policy = PollPolicy::new(Duration::from_millis(1), 15);
        let answer = solve(&solver, vec![1, 2, 3], policy).await.expect("solve");
        assert_eq!(answer.as_deref(), Some("abcd"));
    }

    #[tokio::test]
    async fn test_solve_gives_up_after_max_polls() {
        let mut solver = MockCaptchaSolver::new();
        solver.expect_submit().returning(|_| Ok("7".to_string()));
        solver.expect_check().times(3).returning(|_| Ok(SolverPoll::Pending));

        let policy = PollPolicy::new(Duration::from_millis(1), 3);
        assert_eq!(solve(&solver, Vec::new(), policy).await.expect("solve"), None);
    }

    #[tokio::test]
    async fn test_solver_error_stops_polling() {
        let mut solver = MockCaptchaSolver::new();
        solver.expect_submit().returning(|_| Ok("7".to_string()));
        solver
            .expect_check()
            .times(1)
            .returning(|_| Err(TrackerError::Solver("ERROR_CAPTCHA_UNSOLVABLE".to_string())));

        let policy = PollPolicy::new(Duration::from_millis(1), 15);
        assert!(solve(&solver, Vec::new(), policy).await.is_err());
    }
}
