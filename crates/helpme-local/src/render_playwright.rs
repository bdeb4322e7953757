use helpme_core::{Error, PageRenderer, Result};
use std::path::Path;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout};

/// Time the page gets to produce a `<body>`.
pub const DEFAULT_WAIT_MS: u64 = 10_000;
/// Added on top of the wait budget for navigation and screenshot encoding.
const HARD_TIMEOUT_SLACK_MS: u64 = 30_000;
const VIEWPORT_WIDTH: u32 = 1920;

fn env_truthy(k: &str) -> bool {
    matches!(
        std::env::var(k)
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn node_path_candidates() -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    if let Some(home) = std::env::var_os("HOME").map(std::path::PathBuf::from) {
        out.push(
            home.join(".npm-global")
                .join("lib")
                .join("node_modules")
                .to_string_lossy()
                .to_string(),
        );
    }
    out.push("/opt/homebrew/lib/node_modules".to_string());
    out.push("/usr/local/lib/node_modules".to_string());
    out.push("/usr/lib/node_modules".to_string());
    out
}

fn detect_node_path_for_playwright() -> Option<String> {
    fn node_path_has_playwright(np: &str) -> bool {
        np.split(':')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .any(|p| std::path::PathBuf::from(p).join("playwright").is_dir())
    }

    if let Some(v) = crate::env("HELPME_NODE_PATH") {
        return Some(v);
    }

    let existing = std::env::var("NODE_PATH").ok().unwrap_or_default();
    if node_path_has_playwright(&existing) {
        return None;
    }

    let found = node_path_candidates()
        .into_iter()
        .find(|root| std::path::PathBuf::from(root).join("playwright").is_dir())?;
    if existing.trim().is_empty() {
        Some(found)
    } else {
        Some(format!("{existing}:{found}"))
    }
}

// One browser for the lifetime of the process; one JSON request per stdin line, one JSON
// reply per stdout line. EOF on stdin closes the browser.
const JS: &str = r#"
const readline = require('readline');

function reply(obj) { process.stdout.write(JSON.stringify(obj) + '\n'); }

let pw;
try { pw = require('playwright'); } catch (e) {
  reply({ id: 0, ok: false, code: 'not_configured',
    message: 'Playwright is not installed for Node.js. Install with `npm i -g playwright` and `npx playwright install chromium`.' });
  process.exit(0);
}

let browserPromise = null;
function browser() {
  if (!browserPromise) browserPromise = pw.chromium.launch({ headless: true });
  return browserPromise;
}

async function shoot(req) {
  const b = await browser();
  const page = await b.newPage({ viewport: { width: req.width, height: 1080 } });
  try {
    await page.goto(req.url, { waitUntil: 'domcontentloaded', timeout: req.wait_ms });
    await page.waitForSelector('body', { timeout: req.wait_ms });
    const height = await page.evaluate(() => document.body.scrollHeight);
    await page.setViewportSize({ width: req.width, height: Math.max(1, height) });
    await page.screenshot({ path: req.path, fullPage: true });
  } finally {
    try { await page.close(); } catch (_) {}
  }
}

const rl = readline.createInterface({ input: process.stdin });
let queue = Promise.resolve();
rl.on('line', (line) => {
  let req;
  try { req = JSON.parse(line); } catch (_) { return; }
  queue = queue.then(async () => {
    try {
      await shoot(req);
      reply({ id: req.id, ok: true });
    } catch (e) {
      reply({ id: req.id, ok: false, code: 'render_failed', message: String(e && e.message ? e.message : e) });
    }
  });
});
rl.on('close', () => {
  queue.then(async () => {
    try { if (browserPromise) await (await browserPromise).close(); } catch (_) {}
    process.exit(0);
  });
});
"#;

struct BrowserSession {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
}

/// Headless Chromium driven through a long-lived Node + Playwright child process.
///
/// The process starts on the first screenshot and is reused afterwards. A request that times
/// out or breaks the pipe tears the session down; the next request starts a fresh one.
pub struct PlaywrightRenderer {
    node_bin: String,
    wait_ms: u64,
    session: tokio::sync::Mutex<Option<BrowserSession>>,
}

impl std::fmt::Debug for PlaywrightRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaywrightRenderer")
            .field("node_bin", &self.node_bin)
            .field("wait_ms", &self.wait_ms)
            .finish_non_exhaustive()
    }
}

impl Default for PlaywrightRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaywrightRenderer {
    pub fn new() -> Self {
        Self {
            node_bin: "node".to_string(),
            wait_ms: DEFAULT_WAIT_MS,
            session: tokio::sync::Mutex::new(None),
        }
    }

    pub fn from_env() -> Self {
        let mut r = Self::new();
        if let Some(bin) = crate::env("HELPME_NODE") {
            r.node_bin = bin;
        }
        r
    }

    pub fn with_node_bin(mut self, bin: impl Into<String>) -> Self {
        self.node_bin = bin.into();
        self
    }

    pub fn with_wait_ms(mut self, wait_ms: u64) -> Self {
        self.wait_ms = wait_ms;
        self
    }

    fn hard_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_ms.saturating_add(HARD_TIMEOUT_SLACK_MS))
    }

    fn spawn(&self) -> Result<BrowserSession> {
        let mut cmd = tokio::process::Command::new(&self.node_bin);
        if let Some(node_path) = detect_node_path_for_playwright() {
            cmd.env("NODE_PATH", node_path);
        }
        let mut child = cmd
            .arg("-e")
            .arg(JS)
            .kill_on_drop(true)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::NotConfigured(format!(
                    "screenshots require Node.js (`{}`) and the Playwright npm package: {e}",
                    self.node_bin
                ))
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Render("browser process: missing stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Render("browser process: missing stdout pipe".to_string()))?;
        tracing::info!(node = %self.node_bin, "started headless browser process");
        Ok(BrowserSession {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 1,
        })
    }

    async fn round_trip(session: &mut BrowserSession, line: String, id: u64) -> Result<()> {
        session
            .stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::Render(format!("browser process write: {e}")))?;
        session
            .stdin
            .flush()
            .await
            .map_err(|e| Error::Render(format!("browser process write: {e}")))?;

        loop {
            let Some(raw) = session
                .stdout
                .next_line()
                .await
                .map_err(|e| Error::Render(format!("browser process read: {e}")))?
            else {
                return Err(Error::Render("browser process exited".to_string()));
            };
            let Ok(v) = serde_json::from_str::<serde_json::Value>(raw.trim()) else {
                continue;
            };
            let reply_id = v.get("id").and_then(|x| x.as_u64()).unwrap_or(0);
            if reply_id != id && reply_id != 0 {
                continue;
            }
            if v.get("ok").and_then(|x| x.as_bool()) == Some(true) {
                return Ok(());
            }
            let message = v
                .get("message")
                .and_then(|x| x.as_str())
                .unwrap_or("screenshot failed")
                .to_string();
            return Err(match v.get("code").and_then(|x| x.as_str()) {
                Some("not_configured") => Error::NotConfigured(message),
                _ => Error::Render(message),
            });
        }
    }
}

#[async_trait::async_trait]
impl PageRenderer for PlaywrightRenderer {
    async fn screenshot(&self, url: &str, dest: &Path) -> Result<()> {
        if env_truthy("HELPME_RENDER_DISABLE") {
            return Err(Error::NotConfigured(
                "render backend disabled (HELPME_RENDER_DISABLE)".to_string(),
            ));
        }

        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.spawn()?);
        }
        let Some(session) = guard.as_mut() else {
            return Err(Error::Render("browser session unavailable".to_string()));
        };

        let id = session.next_id;
        session.next_id += 1;
        let mut line = serde_json::json!({
            "id": id,
            "url": url,
            "path": dest.to_string_lossy(),
            "wait_ms": self.wait_ms,
            "width": VIEWPORT_WIDTH,
        })
        .to_string();
        line.push('\n');

        let hard = self.hard_timeout();
        let outcome = match tokio::time::timeout(hard, Self::round_trip(session, line, id)).await {
            Ok(r) => r,
            Err(_) => Err(Error::Render(format!(
                "screenshot hard timeout after {}ms",
                hard.as_millis()
            ))),
        };

        // Page-level failures leave the browser usable; anything else means the pipe is gone.
        let keep = match &outcome {
            Ok(()) => true,
            Err(Error::Render(m)) => !(m.starts_with("browser process") || m.contains("hard timeout")),
            Err(_) => false,
        };
        if !keep {
            if let Some(mut dead) = guard.take() {
                let _ = dead.child.start_kill();
                tracing::warn!("headless browser session reset");
            }
        }
        outcome
    }

    async fn shutdown(&self) {
        let Some(mut session) = self.session.lock().await.take() else {
            return;
        };
        // Closing stdin lets the script close the browser and exit on its own.
        drop(session.stdin);
        match tokio::time::timeout(Duration::from_secs(5), session.child.wait()).await {
            Ok(_) => tracing::info!("headless browser process exited"),
            Err(_) => {
                let _ = session.child.kill().await;
                tracing::warn!("headless browser process killed after shutdown timeout");
            }
        }
    }
}
