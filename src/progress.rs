//! Console output for a scan
//!
//! - [`StatusPrinter`]: full-screen worker status view, redrawn every second
//! - [`print_header`] / [`print_summary`]: start and end of run banners
//! - [`print_plan_summary`]: result of packing a schedule
//!
//! The status view shows one page of workers sized to the terminal. Typing a
//! page number and <ENTER> switches pages; <ENTER> alone toggles between the
//! status view and the log. While the status view is up, the log filter is
//! narrowed to errors through a [`LogSwitch`].

use crate::config::ScanConfig;
use crate::coordinator::RunSummary;
use crate::schedule::Assignment;
use crate::status::{StatusRegistry, StatusSnapshot};
use crate::worker::{JobQueueReceiver, ScanMode};
use console::{style, Term};
use std::io::{self, BufRead};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Lines taken by the queue, overseer and footer lines plus some slack
const RESERVED_LINES: usize = 6;

const REDRAW: Duration = Duration::from_secs(1);

/// One rendered screen
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPage {
    pub lines: Vec<String>,

    /// 1-based page actually shown
    pub page: usize,
    pub total_pages: usize,
}

/// Render the status screen for a terminal of `height` lines
///
/// `page` is clamped into the valid range.
pub fn render_status(
    snapshot: &StatusSnapshot,
    queue_lens: &[usize],
    page: usize,
    height: usize,
) -> StatusPage {
    let per_page = height.saturating_sub(RESERVED_LINES).max(1);
    let total_pages = snapshot.workers.len().div_ceil(per_page).max(1);
    let page = page.clamp(1, total_pages);

    let mut lines = Vec::with_capacity(per_page + 3);

    let queues = queue_lens
        .iter()
        .map(|len| len.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    lines.push(format!("Queues: {} items", queues));
    lines.push(format!("{} Overseer: {}", snapshot.method, snapshot.message));

    for worker in snapshot.workers.iter().skip((page - 1) * per_page).take(per_page) {
        let counts = match worker.skipped {
            Some(skipped) => format!(
                "Success: {}, Failed: {}, No Items: {}, Skipped: {}",
                worker.success, worker.fail, worker.no_items, skipped
            ),
            None => format!(
                "Success: {}, Failed: {}, No Items: {}",
                worker.success, worker.fail, worker.no_items
            ),
        };
        lines.push(format!("Worker {:03} - {} - {}", worker.id, counts, worker.message));
    }

    lines.push(format!(
        "Page {}/{}.  Type page number and <ENTER> to switch pages.  \
         Press <ENTER> alone to switch between status and log view",
        page, total_pages
    ));

    StatusPage {
        lines,
        page,
        total_pages,
    }
}

/// Handle to the reloadable global log filter
pub type LogHandle = reload::Handle<EnvFilter, Registry>;

/// Swaps the log filter between the status view and the log view
#[derive(Clone)]
pub struct LogSwitch {
    handle: LogHandle,
    quiet: String,
    normal: String,
}

impl LogSwitch {
    /// `quiet` applies while the status view is up, `normal` otherwise
    pub fn new(handle: LogHandle, quiet: impl Into<String>, normal: impl Into<String>) -> Self {
        Self {
            handle,
            quiet: quiet.into(),
            normal: normal.into(),
        }
    }

    pub fn show_logs(&self, on: bool) {
        let directives = if on { &self.normal } else { &self.quiet };
        if let Err(e) = self.handle.reload(EnvFilter::new(directives)) {
            warn!(error = %e, "Failed to switch log filter");
        }
    }
}

/// Shared state between the printer and the keyboard thread
#[derive(Debug)]
struct PageControl {
    display: AtomicBool,
    page: AtomicUsize,
}

impl PageControl {
    /// Apply one line of keyboard input; returns the new display state when
    /// the view was toggled
    fn handle_input(&self, line: &str) -> Option<bool> {
        let line = line.trim();
        if line.is_empty() {
            let was = self.display.fetch_xor(true, Ordering::Relaxed);
            return Some(!was);
        }
        if let Ok(page) = line.parse::<usize>() {
            self.page.store(page, Ordering::Relaxed);
        }
        None
    }
}

/// Background status screen
pub struct StatusPrinter {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StatusPrinter {
    /// Start redrawing; the keyboard thread is detached since stdin reads
    /// cannot be interrupted
    pub fn spawn(
        registry: Arc<StatusRegistry>,
        queues: Vec<JobQueueReceiver>,
        logs: Option<LogSwitch>,
    ) -> io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let control = Arc::new(PageControl {
            display: AtomicBool::new(true),
            page: AtomicUsize::new(1),
        });

        let input_control = Arc::clone(&control);
        thread::Builder::new()
            .name("status-input".into())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            let toggled = input_control.handle_input(&line);
                            if let (Some(display), Some(logs)) = (toggled, &logs) {
                                logs.show_logs(!display);
                            }
                        }
                        Err(_) => break,
                    }
                }
            })?;

        let printer_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("status-printer".into())
            .spawn(move || {
                let term = Term::stdout();
                while !printer_stop.load(Ordering::Relaxed) {
                    if control.display.load(Ordering::Relaxed) {
                        let (height, _width) = term.size();
                        let lens: Vec<usize> = queues.iter().map(|q| q.len()).collect();
                        let screen = render_status(
                            &registry.snapshot(),
                            &lens,
                            control.page.load(Ordering::Relaxed),
                            usize::from(height),
                        );
                        control.page.store(screen.page, Ordering::Relaxed);

                        let _ = term.clear_screen();
                        let _ = term.write_line(&screen.lines.join("\n"));
                    }
                    thread::sleep(REDRAW);
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop redrawing and wait for the printer thread
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a header at the start of the scan
pub fn print_header(config: &ScanConfig) {
    println!();
    println!("{} {}", style("hexsweep").cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("{}", style("─".repeat(50)).dim());

    match (config.mode(), &config.spawn_schedule) {
        (ScanMode::SpawnScan, Some(path)) => {
            println!("  {} Spawn Scan ({})", style("Mode:").bold(), path.display());
        }
        _ => {
            println!(
                "  {} Hex Grid ({} rings, {} km steps)",
                style("Mode:").bold(),
                config.step_limit,
                config.grid_settings().step_distance_km()
            );
        }
    }
    if let Some(location) = config.location {
        println!("  {} {:.6},{:.6}", style("Location:").bold(), location.lat, location.lng);
    }
    println!("  {} {}", style("Workers:").bold(), config.worker_count());
    println!("  {} {}s", style("Scan delay:").bold(), config.scan_delay.as_secs_f64());
    println!();
}

/// Print a summary of the run
pub fn print_summary(summary: &RunSummary) {
    let duration_secs = summary.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        summary.scanned() as f64 / duration_secs * 60.0
    } else {
        0.0
    };

    println!();
    println!("{}", style("Scan Stopped").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Workers:").bold(), summary.workers);
    if let Some(tracked) = summary.spawns_tracked {
        println!("  {} {}", style("Spawns:").bold(), format_number(tracked as u64));
    }
    println!("  {} {}", style("Success:").bold(), format_number(summary.success));
    println!("  {} {}", style("No items:").bold(), format_number(summary.no_items));
    if let Some(skipped) = summary.skipped {
        println!("  {} {}", style("Skipped:").bold(), format_number(skipped));
    }
    println!(
        "  {} {:.1}s ({:.1} scans/min)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if summary.fail > 0 {
        println!("  {} {}", style("Failed:").yellow().bold(), format_number(summary.fail));
    }
    println!();
}

/// Print the outcome of `hexsweep plan`
pub fn print_plan_summary(assignment: &Assignment, output: &Path) {
    println!();
    println!("{}", style("Schedule Written").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Scheduled:").bold(),
        format_number(assignment.schedule.len() as u64)
    );
    for (worker, size) in assignment.queue_sizes.iter().enumerate() {
        println!("    worker {:03}: {}", worker, size);
    }
    if let (Some(avg), Some(max)) = (assignment.average_delay(), assignment.max_delay()) {
        println!(
            "  {} {} points, avg {:.1}s, max {:.1}s",
            style("Delayed:").bold(),
            assignment.delays.len(),
            avg,
            max
        );
    }
    if !assignment.rejected.is_empty() {
        println!(
            "  {} {}",
            style("Rejected:").yellow().bold(),
            format_number(assignment.rejected.len() as u64)
        );
    }
    println!("  {} {}", style("Output:").bold(), output.display());
    println!();
}
