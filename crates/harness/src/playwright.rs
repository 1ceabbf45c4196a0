//! Playwright browser automation
//!
//! Each session runs a Node bridge process hosting one browser and one
//! context. Commands travel as JSON lines over stdin; each reply on stdout
//! carries the id of the command it answers.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::BrowserConfig;
use crate::driver::{BrowserDriver, DriverLauncher};
use crate::error::{HarnessError, HarnessResult};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(HarnessError::Config(format!("unknown browser '{}'", other))),
        }
    }
}

const STARTUP_TIMEOUT: Duration = Duration::from_secs(60);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Starts one bridge process per session
pub struct PlaywrightLauncher {
    config: BrowserConfig,
    script_path: PathBuf,
    _script_dir: TempDir,
}

impl PlaywrightLauncher {
    /// Verify Node and Playwright are available and stage the bridge script
    pub fn new(config: BrowserConfig) -> HarnessResult<Self> {
        Self::check_playwright_installed(&config)?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;
        debug!("Playwright bridge staged at {}", script_path.display());

        Ok(Self {
            config,
            script_path,
            _script_dir: script_dir,
        })
    }

    fn check_playwright_installed(config: &BrowserConfig) -> HarnessResult<()> {
        let status = Command::new(&config.node_binary)
            .args([
                "-e",
                "require(require('module').createRequire(process.cwd() + '/package.json').resolve('playwright'))",
            ])
            .current_dir(&config.project_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(HarnessError::Driver(format!(
                "Playwright not found from {}. Install with: npm install playwright && npx playwright install",
                config.project_dir.display()
            ))),
        }
    }
}

#[async_trait]
impl DriverLauncher for PlaywrightLauncher {
    async fn launch(&self) -> HarnessResult<Arc<dyn BrowserDriver>> {
        let session = PlaywrightSession::spawn(&self.config, &self.script_path).await?;
        Ok(Arc::new(session))
    }
}

struct BridgeRequest {
    op: &'static str,
    args: Value,
    reply: Option<oneshot::Sender<HarnessResult<Value>>>,
}

#[derive(Debug, Deserialize)]
struct BridgeReply {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl BridgeReply {
    fn into_result(self, op: &str, args: &Value) -> HarnessResult<Value> {
        if self.ok {
            return Ok(self.value);
        }
        let message = self.error.unwrap_or_else(|| "unknown bridge error".to_string());
        Err(match self.kind.as_deref() {
            Some("timeout") => HarnessError::Timeout(message),
            Some("not_found") => HarnessError::ElementNotFound(message),
            Some("navigation") => HarnessError::Navigation {
                url: args["url"].as_str().unwrap_or_default().to_string(),
                reason: message,
            },
            _ => HarnessError::Driver(format!("{}: {}", op, message)),
        })
    }
}

/// A live browser context driven through the bridge
pub struct PlaywrightSession {
    session_id: String,
    requests: mpsc::UnboundedSender<BridgeRequest>,
    child: Mutex<Option<Child>>,
}

impl PlaywrightSession {
    pub async fn spawn(config: &BrowserConfig, script_path: &Path) -> HarnessResult<Self> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let options = json!({
            "browser": config.browser.as_str(),
            "headless": config.headless,
            "width": config.viewport_width,
            "height": config.viewport_height,
            "implicitWaitMs": config.implicit_wait_ms,
        });

        let mut child = TokioCommand::new(&config.node_binary)
            .arg(script_path)
            .arg(options.to_string())
            .current_dir(&config.project_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| HarnessError::Driver(format!("failed to spawn {}: {}", config.node_binary, e)))?;

        let stdin = child.stdin.take().ok_or_else(|| HarnessError::Driver("bridge stdin unavailable".into()))?;
        let stdout = child.stdout.take().ok_or_else(|| HarnessError::Driver("bridge stdout unavailable".into()))?;
        if let Some(stderr) = child.stderr.take() {
            let id = session_id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[bridge {}] {}", id, line);
                }
            });
        }

        let mut stdout = BufReader::new(stdout).lines();
        let ready = timeout(STARTUP_TIMEOUT, read_reply(&mut stdout, 0))
            .await
            .map_err(|_| HarnessError::Timeout("browser startup".to_string()))??;
        ready.into_result("launch", &Value::Null)?;

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(pump(stdin, stdout, rx));

        info!("Started {} session {}", config.browser.as_str(), session_id);
        Ok(Self {
            session_id,
            requests: tx,
            child: Mutex::new(Some(child)),
        })
    }

    async fn execute(&self, op: &'static str, args: Value) -> HarnessResult<Value> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(BridgeRequest { op, args, reply: Some(tx) })
            .map_err(|_| HarnessError::Driver(format!("session {} is closed", self.session_id)))?;
        rx.await
            .map_err(|_| HarnessError::Driver(format!("session {} dropped reply to {}", self.session_id, op)))?
    }

    async fn execute_string(&self, op: &'static str, args: Value) -> HarnessResult<String> {
        match self.execute(op, args).await? {
            Value::String(s) => Ok(s),
            Value::Null => Ok(String::new()),
            other => Ok(other.to_string()),
        }
    }
}

/// Read stdout until the reply for request `id` arrives
///
/// Lines that are not replies, or answer some other request, are skipped.
async fn read_reply<R>(lines: &mut Lines<R>, id: u64) -> HarnessResult<BridgeReply>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let line = lines
            .next_line()
            .await?
            .ok_or_else(|| HarnessError::Driver("bridge exited".to_string()))?;
        match serde_json::from_str::<BridgeReply>(&line) {
            Ok(reply) if reply.id == id => return Ok(reply),
            Ok(reply) => debug!("Skipping stale reply {} while waiting for {}", reply.id, id),
            Err(_) => debug!("Skipping bridge output: {}", line),
        }
    }
}

/// Forward requests to the bridge one at a time, pairing each with its reply
async fn pump(
    mut stdin: ChildStdin,
    mut stdout: Lines<BufReader<ChildStdout>>,
    mut requests: mpsc::UnboundedReceiver<BridgeRequest>,
) {
    let mut next_id: u64 = 0;

    while let Some(request) = requests.recv().await {
        next_id += 1;
        let line = json!({ "id": next_id, "op": request.op, "args": request.args }).to_string() + "\n";

        let result = match stdin.write_all(line.as_bytes()).await {
            Ok(()) => match stdin.flush().await {
                Ok(()) => read_reply(&mut stdout, next_id)
                    .await
                    .and_then(|r| r.into_result(request.op, &request.args)),
                Err(e) => Err(e.into()),
            },
            Err(e) => Err(e.into()),
        };

        match request.reply {
            Some(reply) => {
                let _ = reply.send(result);
            }
            None => {
                if let Err(e) = result {
                    warn!("Detached {} failed: {}", request.op, e);
                }
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

#[async_trait]
impl BrowserDriver for PlaywrightSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn navigate(&self, url: &str) -> HarnessResult<()> {
        self.execute("goto", json!({ "url": url })).await.map(|_| ())
    }

    async fn wait_for_text(&self, text: &str, timeout: Duration, scope: Option<&str>) -> HarnessResult<()> {
        self.execute(
            "wait_for_text",
            json!({ "text": text, "timeout_ms": millis(timeout), "scope": scope }),
        )
        .await
        .map_err(|e| match e {
            HarnessError::Timeout(_) => HarnessError::Timeout(format!("text '{}'", text)),
            other => other,
        })
        .map(|_| ())
    }

    async fn fill_field(&self, locator: &str, value: &str) -> HarnessResult<()> {
        self.execute("fill", json!({ "locator": locator, "value": value })).await.map(|_| ())
    }

    async fn type_text(&self, selector: &str, text: &str) -> HarnessResult<()> {
        self.execute("type", json!({ "selector": selector, "text": text })).await.map(|_| ())
    }

    async fn click(&self, locator: &str) -> HarnessResult<()> {
        self.execute("click", json!({ "locator": locator })).await.map(|_| ())
    }

    async fn page_text(&self) -> HarnessResult<String> {
        self.execute_string("page_text", Value::Null).await
    }

    async fn text_of(&self, selector: &str, timeout: Duration) -> HarnessResult<String> {
        self.execute_string("text_of", json!({ "selector": selector, "timeout_ms": millis(timeout) }))
            .await
    }

    async fn field_value(&self, locator: &str) -> HarnessResult<String> {
        self.execute_string("field_value", json!({ "locator": locator })).await
    }

    async fn current_url(&self) -> HarnessResult<String> {
        self.execute_string("url", Value::Null).await
    }

    async fn title(&self) -> HarnessResult<String> {
        self.execute_string("title", Value::Null).await
    }

    async fn get_cookie(&self, name: &str) -> HarnessResult<Option<String>> {
        match self.execute("get_cookie", json!({ "name": name })).await? {
            Value::String(value) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    async fn set_cookie(&self, name: &str, value: &str) -> HarnessResult<()> {
        self.execute("set_cookie", json!({ "name": name, "value": value })).await.map(|_| ())
    }

    async fn clear_cookie(&self, name: &str) -> HarnessResult<()> {
        self.execute("clear_cookie", json!({ "name": name })).await.map(|_| ())
    }

    async fn set_request_headers(&self, headers: &[(String, String)]) -> HarnessResult<()> {
        let headers: serde_json::Map<String, Value> = headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.execute("set_headers", json!({ "headers": headers })).await.map(|_| ())
    }

    async fn intercept(&self, url_prefix: &str) -> HarnessResult<()> {
        self.execute("intercept", json!({ "prefix": url_prefix })).await.map(|_| ())
    }

    async fn stop_intercepting(&self, url_prefix: &str) -> HarnessResult<()> {
        self.execute("unintercept", json!({ "prefix": url_prefix })).await.map(|_| ())
    }

    fn stop_intercepting_detached(&self, url_prefix: &str) {
        let request = BridgeRequest {
            op: "unintercept",
            args: json!({ "prefix": url_prefix }),
            reply: None,
        };
        if self.requests.send(request).is_err() {
            debug!("Session {} already closed; interception ends with it", self.session_id);
        }
    }

    async fn close(&self) -> HarnessResult<()> {
        let Some(mut child) = self.child.lock().take() else {
            return Ok(());
        };

        if let Err(e) = timeout(CLOSE_TIMEOUT, self.execute("close", Value::Null)).await.unwrap_or_else(|_| {
            Err(HarnessError::Timeout(format!("closing session {}", self.session_id)))
        }) {
            warn!("Session {} did not close cleanly: {}", self.session_id, e);
            terminate(&child);
        }

        match timeout(CLOSE_TIMEOUT, child.wait()).await {
            Ok(Ok(status)) => debug!("Bridge for {} exited with {}", self.session_id, status),
            _ => {
                warn!("Force killing bridge for session {}", self.session_id);
                let _ = child.kill().await;
            }
        }

        debug!("Closed session {}", self.session_id);
        Ok(())
    }
}

/// Ask the bridge to shut down before it is killed
fn terminate(child: &Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        }
    }
    #[cfg(not(unix))]
    let _ = child;
}

/// Node side of the session protocol
const BRIDGE_SCRIPT: &str = r##"
const { createRequire } = require('module');
const path = require('path');
const readline = require('readline');

const playwright = createRequire(path.join(process.cwd(), 'package.json'))('playwright');
const options = JSON.parse(process.argv[2]);
const routes = new Map();
let browser, context, page;

function reply(message) {
  process.stdout.write(JSON.stringify(message) + '\n');
}

function fail(kind, message) {
  const error = new Error(message);
  error.kind = kind;
  return error;
}

function classify(error) {
  if (error && error.kind) return error.kind;
  if (error && error.name === 'TimeoutError') return 'timeout';
  return 'driver';
}

const looksLikeCss = (locator) => /^[#.\[]/.test(locator) || /[\[\]=>]/.test(locator);

async function firstPresent(candidates, what) {
  const deadline = Date.now() + options.implicitWaitMs;
  for (;;) {
    for (const candidate of candidates) {
      if ((await candidate.count()) > 0) return candidate.first();
    }
    if (Date.now() >= deadline) throw fail('not_found', what);
    await new Promise((resolve) => setTimeout(resolve, 100));
  }
}

function fieldCandidates(locator) {
  if (looksLikeCss(locator)) return [page.locator(locator)];
  const quoted = JSON.stringify(locator);
  return [
    page.locator(`[name=${quoted}]`),
    page.locator(`[id=${quoted}]`),
    page.getByLabel(locator, { exact: true }),
  ];
}

function clickableCandidates(locator) {
  if (looksLikeCss(locator)) return [page.locator(locator)];
  return [
    page.getByRole('button', { name: locator, exact: true }),
    page.getByRole('link', { name: locator, exact: true }),
    page.getByText(locator, { exact: true }),
  ];
}

const handlers = {
  async goto({ url }) {
    try {
      await page.goto(url, { waitUntil: 'domcontentloaded' });
    } catch (error) {
      throw fail('navigation', error.message);
    }
    return null;
  },
  async wait_for_text({ text, timeout_ms, scope }) {
    await page.waitForFunction(
      ([t, s]) => {
        const root = document.querySelector(s || 'body');
        return !!root && root.innerText.includes(t);
      },
      [text, scope],
      { timeout: timeout_ms },
    );
    return null;
  },
  async fill({ locator, value }) {
    const field = await firstPresent(fieldCandidates(locator), `field ${locator}`);
    await field.fill(value);
    return null;
  },
  async type({ selector, text }) {
    const field = await firstPresent([page.locator(selector)], `element ${selector}`);
    await field.pressSequentially(text);
    return null;
  },
  async click({ locator }) {
    const target = await firstPresent(clickableCandidates(locator), `clickable ${locator}`);
    await target.click();
    return null;
  },
  async page_text() {
    return await page.evaluate(() => (document.body ? document.body.innerText : ''));
  },
  async text_of({ selector, timeout_ms }) {
    const element = page.locator(selector).first();
    await element.waitFor({ timeout: timeout_ms });
    return ((await element.textContent()) || '').trim();
  },
  async field_value({ locator }) {
    const field = await firstPresent(fieldCandidates(locator), `field ${locator}`);
    return await field.inputValue();
  },
  async url() {
    return page.url();
  },
  async title() {
    return await page.title();
  },
  async get_cookie({ name }) {
    const cookie = (await context.cookies()).find((c) => c.name === name);
    return cookie ? cookie.value : null;
  },
  async set_cookie({ name, value }) {
    await context.addCookies([{ name, value, url: page.url() }]);
    return null;
  },
  async clear_cookie({ name }) {
    await context.clearCookies({ name });
    return null;
  },
  async set_headers({ headers }) {
    await page.setExtraHTTPHeaders(headers);
    return null;
  },
  async intercept({ prefix }) {
    const matcher = (url) => url.href.startsWith(prefix);
    routes.set(prefix, matcher);
    await page.route(matcher, (route) =>
      route.fulfill({ status: 200, contentType: 'text/plain', body: route.request().url() }),
    );
    return null;
  },
  async unintercept({ prefix }) {
    const matcher = routes.get(prefix);
    if (matcher) {
      routes.delete(prefix);
      await page.unroute(matcher);
    }
    return null;
  },
  async close() {
    await browser.close();
    return null;
  },
};

(async () => {
  browser = await playwright[options.browser].launch({ headless: options.headless });
  context = await browser.newContext({ viewport: { width: options.width, height: options.height } });
  page = await context.newPage();
  reply({ id: 0, ok: true, value: 'ready' });

  const input = readline.createInterface({ input: process.stdin });
  for await (const line of input) {
    if (!line.trim()) continue;
    const { id, op, args } = JSON.parse(line);
    try {
      const handler = handlers[op];
      if (!handler) throw fail('driver', `unknown op ${op}`);
      reply({ id, ok: true, value: await handler(args || {}) });
    } catch (error) {
      reply({ id, ok: false, kind: classify(error), error: String((error && error.message) || error) });
    }
    if (op === 'close') break;
  }
  process.exit(0);
})().catch((error) => {
  reply({ id: 0, ok: false, kind: 'driver', error: String((error && error.message) || error) });
  process.exit(1);
});
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("chromium", "chromium")]
    #[test_case("Chrome", "chromium")]
    #[test_case("firefox", "firefox")]
    #[test_case("safari", "webkit")]
    fn test_browser_from_str(input: &str, expected: &str) {
        let browser: Browser = input.parse().unwrap();
        assert_eq!(browser.as_str(), expected);
    }

    #[test]
    fn test_unknown_browser_is_config_error() {
        assert!(matches!("lynx".parse::<Browser>(), Err(HarnessError::Config(_))));
    }

    #[test]
    fn test_reply_kinds_map_to_error_taxonomy() {
        let reply = |kind: &str| BridgeReply {
            id: 1,
            ok: false,
            value: Value::Null,
            kind: Some(kind.to_string()),
            error: Some("boom".to_string()),
        };
        let args = json!({ "url": "https://example.test/login" });

        assert!(matches!(reply("timeout").into_result("wait_for_text", &args), Err(HarnessError::Timeout(_))));
        assert!(matches!(reply("not_found").into_result("fill", &args), Err(HarnessError::ElementNotFound(_))));
        match reply("navigation").into_result("goto", &args) {
            Err(HarnessError::Navigation { url, .. }) => assert_eq!(url, "https://example.test/login"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(reply("weird").into_result("title", &args), Err(HarnessError::Driver(_))));
    }

    #[test]
    fn test_ok_reply_yields_value() {
        let reply: BridgeReply = serde_json::from_str(r#"{"id":3,"ok":true,"value":"Sign in"}"#).unwrap();
        assert_eq!(reply.into_result("title", &Value::Null).unwrap(), json!("Sign in"));
    }

    #[tokio::test]
    async fn test_reply_skips_stray_output_and_other_ids() {
        let output = concat!(
            "(node:4242) Warning: something deprecated\n",
            "{\"id\":6,\"ok\":true,\"value\":\"late\"}\n",
            "{\"ok\":true}\n",
            "{\"id\":7,\"ok\":true,\"value\":\"Sign in\"}\n",
        );
        let mut lines = BufReader::new(output.as_bytes()).lines();

        let reply = read_reply(&mut lines, 7).await.unwrap();
        assert_eq!(reply.id, 7);
        assert_eq!(reply.into_result("title", &Value::Null).unwrap(), json!("Sign in"));
    }

    #[tokio::test]
    async fn test_reply_missing_before_exit_is_driver_error() {
        let mut lines = BufReader::new("{\"id\":1,\"ok\":true}\n".as_bytes()).lines();
        assert!(matches!(read_reply(&mut lines, 2).await, Err(HarnessError::Driver(_))));
    }

    #[test]
    fn test_bridge_script_handles_every_op() {
        for op in [
            "goto", "wait_for_text", "fill", "type", "click", "page_text", "text_of", "field_value",
            "url", "title", "get_cookie", "set_cookie", "clear_cookie", "set_headers", "intercept",
            "unintercept", "close",
        ] {
            assert!(BRIDGE_SCRIPT.contains(&format!("async {}(", op)), "missing handler {}", op);
        }
    }
}
