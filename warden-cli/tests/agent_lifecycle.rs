use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use warden_core::{policy, ValueName};
use warden_daemon::paths::policies_root;

const DOC: &str = "personalization.yaml";
const NAME: &str = "lock_screen_image";

fn warden_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("warden"));
    cmd.env("HOME", home).env("USERPROFILE", home);
    cmd
}

struct AgentProcess {
    child: Child,
    home: PathBuf,
}

impl AgentProcess {
    fn start(home: PathBuf) -> Self {
        let child = warden_cmd(&home)
            .args(["run", "--grace-secs", "1"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn agent");

        Self { child, home }
    }

    fn stop(&mut self) {
        let _ = warden_cmd(&self.home).arg("stop").status();

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            sleep(Duration::from_millis(50));
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for AgentProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn agent_state(home: &Path) -> Option<String> {
    let output = warden_cmd(home).args(["status", "--json"]).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).ok()?;
    value
        .get("state")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

fn seed_value(home: &Path, value: &str) {
    policy::write_value(
        &policies_root(home),
        Path::new(DOC),
        &ValueName::from(NAME),
        value,
    )
    .expect("write policy value");
}

fn read_value(home: &Path) -> Option<String> {
    policy::read_value(&policies_root(home), Path::new(DOC), &ValueName::from(NAME)).ok()
}

#[test]
fn tampered_value_is_reverted() {
    let home = TempDir::new().expect("home");
    seed_value(home.path(), "corp.png");

    let mut agent = AgentProcess::start(home.path().to_path_buf());
    assert!(
        wait_until(Duration::from_secs(5), || {
            agent_state(home.path()).as_deref() == Some("running")
        }),
        "agent did not report running state in time",
    );
    // The directory watch arms asynchronously after the state flips to running.
    sleep(Duration::from_millis(300));

    seed_value(home.path(), "evil.png");

    let reverted = wait_until(Duration::from_secs(10), || {
        read_value(home.path()).as_deref() == Some("corp.png")
    });
    assert!(
        reverted,
        "agent did not revert the tampered value within timeout",
    );

    agent.stop();
    assert!(
        wait_until(Duration::from_secs(3), || {
            agent_state(home.path()).is_none()
                || agent_state(home.path()).as_deref() == Some("stopped")
        }),
        "agent did not stop after the stop command",
    );
}

#[test]
fn paused_agent_leaves_changes_alone_and_adopts_them_on_resume() {
    let home = TempDir::new().expect("home");
    seed_value(home.path(), "corp.png");

    let mut agent = AgentProcess::start(home.path().to_path_buf());
    assert!(
        wait_until(Duration::from_secs(5), || {
            agent_state(home.path()).as_deref() == Some("running")
        }),
        "agent did not report running state in time",
    );

    let pause = warden_cmd(home.path()).arg("pause").output().expect("pause");
    assert!(
        pause.status.success(),
        "pause failed: {}",
        String::from_utf8_lossy(&pause.stderr),
    );
    assert!(
        wait_until(Duration::from_secs(2), || {
            agent_state(home.path()).as_deref() == Some("paused")
        }),
        "agent did not report paused state",
    );

    seed_value(home.path(), "evil.png");
    // Longer than the 1s grace delay; a paused agent must not act.
    sleep(Duration::from_secs(3));
    assert_eq!(
        read_value(home.path()).as_deref(),
        Some("evil.png"),
        "paused agent must not revert",
    );

    let resume = warden_cmd(home.path())
        .arg("continue")
        .output()
        .expect("continue");
    assert!(
        resume.status.success(),
        "continue failed: {}",
        String::from_utf8_lossy(&resume.stderr),
    );
    assert!(
        wait_until(Duration::from_secs(2), || {
            agent_state(home.path()).as_deref() == Some("running")
        }),
        "agent did not report running state after continue",
    );
    sleep(Duration::from_millis(300));

    // The value changed during the pause was adopted as the new guard.
    seed_value(home.path(), "worse.png");
    let reverted = wait_until(Duration::from_secs(10), || {
        read_value(home.path()).as_deref() == Some("evil.png")
    });
    assert!(
        reverted,
        "resumed agent must enforce the guard adopted at continue",
    );

    agent.stop();
}
