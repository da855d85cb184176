//! Cruz del Sur protocol tests with a scripted browser and a mocked captcha solver

use async_trait::async_trait;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use mockall::mock;
use shipment_tracker::browser::{BrowserLauncher, BrowserSession};
use shipment_tracker::captcha::{CaptchaSolver, SolverPoll};
use shipment_tracker::config::{AppConfig, CruzDelSurConfig};
use shipment_tracker::cruz_del_sur::{CruzDelSurLookup, Outcome};
use shipment_tracker::poll::PollPolicy;
use shipment_tracker::{Result, StatusLookup, TrackerError};
use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

mock! {
    Solver {}

    #[async_trait]
    impl CaptchaSolver for Solver {
        async fn submit(&self, image_png: Vec<u8>) -> Result<String>;
        async fn check(&self, job_id: &str) -> Result<SolverPoll>;
    }
}

/// How each scripted page behaves.
#[derive(Clone)]
struct Page {
    form_present: bool,
    submit_button: bool,
    tables: Vec<String>,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            form_present: true,
            submit_button: true,
            tables: vec!["Fecha Estado\n19/05/2025 09:00 En ruta\n20/05/2025 14:30 Entregado".to_string()],
        }
    }
}

#[derive(Default)]
struct Journal {
    launches: usize,
    closes: usize,
    visited: Vec<String>,
    fills: Vec<(String, String)>,
    clicks: Vec<String>,
}

struct ScriptedSession {
    page: Page,
    journal: Arc<Mutex<Journal>>,
}

fn screenshot() -> Vec<u8> {
    let mut png = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(1280, 800))
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .expect("encode screenshot");
    png
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn goto(&self, url: &str) -> Result<()> {
        self.journal.lock().expect("lock").visited.push(url.to_string());
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<()> {
        Ok(())
    }

    async fn fill_by_id(&self, id: &str, text: &str, _timeout: Duration) -> Result<()> {
        if !self.page.form_present {
            return Err(TrackerError::Browser(format!("no element #{id}")));
        }
        self.journal
            .lock()
            .expect("lock")
            .fills
            .push((id.to_string(), text.to_string()));
        Ok(())
    }

    async fn find_text(&self, _phrase: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn click_labelled(&self, label: &str) -> Result<bool> {
        if self.page.submit_button {
            self.journal.lock().expect("lock").clicks.push(label.to_string());
        }
        Ok(self.page.submit_button)
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>> {
        Ok(screenshot())
    }

    async fn table_texts(&self) -> Result<Vec<String>> {
        Ok(self.page.tables.clone())
    }

    async fn page_source(&self) -> Result<String> {
        Ok(String::new())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.journal.lock().expect("lock").closes += 1;
        Ok(())
    }
}

/// Hands out the scripted pages in order, repeating the last one.
struct ScriptedLauncher {
    pages: Vec<Page>,
    journal: Arc<Mutex<Journal>>,
}

#[async_trait]
impl BrowserLauncher for ScriptedLauncher {
    async fn launch(&self) -> Result<Box<dyn BrowserSession>> {
        let mut journal = self.journal.lock().expect("lock");
        let page = self
            .pages
            .get(journal.launches)
            .or_else(|| self.pages.last())
            .cloned()
            .unwrap_or_default();
        journal.launches += 1;
        Ok(Box::new(ScriptedSession {
            page,
            journal: Arc::clone(&self.journal),
        }))
    }
}

fn fast_config(max_attempts: u32) -> CruzDelSurConfig {
    CruzDelSurConfig {
        max_attempts,
        retry_backoff_secs: 0,
        settle_secs: 0,
        ..AppConfig::default().cruz_del_sur
    }
}

fn cruz_lookup(pages: Vec<Page>, solver: MockSolver, max_attempts: u32) -> (CruzDelSurLookup, Arc<Mutex<Journal>>) {
    let journal = Arc::new(Mutex::new(Journal::default()));
    let launcher = Arc::new(ScriptedLauncher {
        pages,
        journal: Arc::clone(&journal),
    });
    let lookup = CruzDelSurLookup::new(
        launcher,
        Arc::new(solver),
        &fast_config(max_attempts),
        &AppConfig::default().solver,
    )
    .with_solver_policy(PollPolicy::new(Duration::from_millis(1), 3));
    (lookup, journal)
}

fn solving_solver(answer: &'static str) -> MockSolver {
    let mut solver = MockSolver::new();
    solver.expect_submit().returning(|_| Ok("job-1".to_string()));
    solver
        .expect_check()
        .returning(move |_| Ok(SolverPoll::Solved(answer.to_string())));
    solver
}

#[tokio::test]
async fn test_full_protocol_returns_latest_event() {
    let mut solver = MockSolver::new();
    solver
        .expect_submit()
        .times(1)
        .withf(|png| {
            image::load_from_memory(png)
                .map(|img| img.dimensions() == (138, 62))
                .unwrap_or(false)
        })
        .returning(|_| Ok("job-9".to_string()));
    let mut polls = 0;
    solver.expect_check().withf(|id| id == "job-9").returning(move |_| {
        polls += 1;
        Ok(if polls < 2 {
            SolverPoll::Pending
        } else {
            SolverPoll::Solved("k3p9".to_string())
        })
    });

    let (lookup, journal) = cruz_lookup(vec![Page::default()], solver, 5);
    let status = lookup.lookup("7001234").await;

    assert_eq!(status.as_deref(), Some("Entregado [20/05/2025 14:30]"));
    let journal = journal.lock().expect("lock");
    assert_eq!(journal.visited, vec!["https://www.cruzdelsurcarga.cl/seguimiento/".to_string()]);
    assert_eq!(
        journal.fills,
        vec![
            ("nrodoc".to_string(), "7001234".to_string()),
            ("captcha".to_string(), "k3p9".to_string()),
        ]
    );
    assert_eq!(journal.clicks, vec!["CONSULTAR".to_string()]);
    assert_eq!((journal.launches, journal.closes), (1, 1));
}

#[tokio::test]
async fn test_missing_form_retries_with_fresh_session() {
    let broken = Page {
        form_present: false,
        ..Page::default()
    };
    let (lookup, journal) = cruz_lookup(vec![broken, Page::default()], solving_solver("abcd"), 5);

    assert_eq!(
        lookup.query("7001234").await,
        Outcome::Status("Entregado [20/05/2025 14:30]".to_string())
    );
    let journal = journal.lock().expect("lock");
    assert_eq!((journal.launches, journal.closes), (2, 2));
}

#[tokio::test]
async fn test_rejected_upload_gives_up_after_max_attempts() {
    let mut solver = MockSolver::new();
    solver
        .expect_submit()
        .times(3)
        .returning(|_| Err(TrackerError::Solver("upload rejected: ERROR_ZERO_BALANCE".to_string())));
    solver.expect_check().never();

    let (lookup, journal) = cruz_lookup(vec![Page::default()], solver, 3);

    assert_eq!(lookup.lookup("7001234").await, None);
    let journal = journal.lock().expect("lock");
    assert_eq!((journal.launches, journal.closes), (3, 3));
}

#[tokio::test]
async fn test_unsolved_captcha_counts_as_failed_attempt() {
    let mut solver = MockSolver::new();
    solver.expect_submit().times(2).returning(|_| Ok("slow".to_string()));
    solver
        .expect_check()
        .times(6)
        .returning(|_| Ok(SolverPoll::Pending));

    let (lookup, journal) = cruz_lookup(vec![Page::default()], solver, 2);

    assert_eq!(lookup.query("7001234").await, Outcome::GaveUp);
    assert!(journal.lock().expect("lock").clicks.is_empty());
}

#[tokio::test]
async fn test_missing_submit_control_gives_up() {
    let no_button = Page {
        submit_button: false,
        ..Page::default()
    };
    let (lookup, journal) = cruz_lookup(vec![no_button], solving_solver("abcd"), 2);

    assert_eq!(lookup.query("7001234").await, Outcome::GaveUp);
    assert_eq!(journal.lock().expect("lock").closes, 2);
}

#[tokio::test]
async fn test_result_without_dates_gives_up() {
    let empty = Page {
        tables: vec!["Sin información para el documento".to_string()],
        ..Page::default()
    };
    let (lookup, _journal) = cruz_lookup(vec![empty], solving_solver("abcd"), 2);

    assert_eq!(lookup.query("7001234").await, Outcome::GaveUp);
}

#[tokio::test]
async fn test_tie_keeps_first_listed_event() {
    let tied = Page {
        tables: vec![
            "20/05/2025 14:30 En reparto".to_string(),
            "20/05/2025 14:30 Entregado\n18/05/2025 08:00 Recibido".to_string(),
        ],
        ..Page::default()
    };
    let (lookup, _journal) = cruz_lookup(vec![tied], solving_solver("abcd"), 1);

    assert_eq!(
        lookup.query("7001234").await,
        Outcome::Status("En reparto [20/05/2025 14:30]".to_string())
    );
}
