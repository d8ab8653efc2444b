//! End-to-end alarm lifecycle tests against a real spool directory and the
//! real process table.

#![cfg(target_os = "linux")]

use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use ffalarms::app::App;
use ffalarms::clock::FakeClock;
use ffalarms::controller::NO_ALARM_RUNNING;
use ffalarms::models::AlarmConfig;
use ffalarms::spool::emitter::TRIGGER;
use ffalarms::spool::script::{render, ScriptParams, MARKER};
use ffalarms::spool::{JobEmitter, JobStateFlag, RenameFlag};

struct Spool {
    _tmp: TempDir,
    dir: PathBuf,
    preset: PathBuf,
}

fn spool() -> Spool {
    let tmp = TempDir::new().expect("create temp dir");
    let dir = std::fs::canonicalize(tmp.path()).expect("canonicalize").join("spool");
    std::fs::create_dir(&dir).expect("mkdir spool");
    let preset = dir.with_file_name("preset.state");
    std::fs::write(&preset, "state.default {}\n").expect("write preset");
    Spool {
        _tmp: tmp,
        dir,
        preset,
    }
}

fn config(spool: &Spool) -> AlarmConfig {
    AlarmConfig {
        spool_dir: spool.dir.clone(),
        state_tool: "sh".to_string(),
        mixer_tool: "sh".to_string(),
        mixer_preset: spool.preset.clone(),
        app_command: Some("/bin/true".to_string()),
        timezone: Some("UTC".to_string()),
        ..AlarmConfig::default()
    }
}

fn make_fifo(path: &Path) -> File {
    let c_path = CString::new(path.as_os_str().as_bytes()).expect("c path");
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    assert_eq!(rc, 0, "mkfifo failed");
    OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .expect("open fifo reader")
}

fn wait_for(what: &str, timeout: Duration, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(start.elapsed() < timeout, "timed out waiting for {}", what);
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// Start a stand-in alarm job the way atd would: `/bin/sh <job>` from the
/// spool directory. It marks itself running, then idles until SIGTERM.
fn start_fake_alarm(dir: &Path, job_id: &str) -> Child {
    let script = format!(
        "#!/bin/sh{}\nNAME=$(basename \"$0\")\ntrap 'rm -f \"x$NAME\"; exit 0' TERM\nmv \"$NAME\" \"x$NAME\"\nwhile :; do sleep 1; done\n",
        MARKER
    );
    std::fs::write(dir.join(job_id), script).expect("write job");
    let child = Command::new("/bin/sh")
        .arg(job_id)
        .current_dir(dir)
        .spawn()
        .expect("spawn job");
    let running = dir.join(format!("x{}", job_id));
    wait_for("job rename", Duration::from_secs(5), || running.exists());
    child
}

fn wait_exit(child: &mut Child) {
    let start = Instant::now();
    loop {
        if child.try_wait().expect("try_wait").is_some() {
            return;
        }
        if start.elapsed() > Duration::from_secs(10) {
            let _ = child.kill();
            panic!("alarm process did not exit after SIGTERM");
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// A real job script wired to stand-in mixer tools. The state tool logs its
/// arguments; the mixer tool swallows the ramp.
struct RealJob {
    spool: Spool,
    snapdir: PathBuf,
    log: PathBuf,
    script: String,
}

fn write_tool(path: &Path, body: &str) {
    std::fs::write(path, body).expect("write tool");
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).expect("chmod tool");
}

fn real_job() -> RealJob {
    let spool = spool();
    let root = spool.dir.parent().expect("spool parent").to_path_buf();
    let snapdir = root.join("snapshots");
    std::fs::create_dir(&snapdir).expect("mkdir snapshots");
    let log = root.join("state.log");
    let state_tool = root.join("alsactl");
    let mixer_tool = root.join("amixer");
    write_tool(
        &state_tool,
        &format!("#!/bin/sh\necho \"$*\" >> '{}'\n", log.display()),
    );
    write_tool(
        &mixer_tool,
        "#!/bin/sh\ncase \"$1\" in --stdin) exec cat >/dev/null ;; esac\nexit 0\n",
    );
    let script = render(&ScriptParams {
        alarm_cmd: "sleep 1".to_string(),
        repeat: 300,
        mixer_preset: spool.preset.to_string_lossy().to_string(),
        state_tool: state_tool.to_string_lossy().to_string(),
        mixer_tool: mixer_tool.to_string_lossy().to_string(),
        mixer_control: "PCM,0".to_string(),
        volume_start: 1,
        volume_end: 2,
        app: "/bin/true".to_string(),
    });
    RealJob {
        spool,
        snapdir,
        log,
        script,
    }
}

fn start_real_alarm(job: &RealJob, job_id: &str) -> Child {
    let preset_restore = format!("-f {} restore", job.spool.preset.display());
    let before = log_lines(job)
        .iter()
        .filter(|line| **line == preset_restore)
        .count();
    std::fs::write(job.spool.dir.join(job_id), &job.script).expect("write job");
    let child = Command::new("/bin/sh")
        .arg(job_id)
        .current_dir(&job.spool.dir)
        .env("TMPDIR", &job.snapdir)
        .spawn()
        .expect("spawn job");
    let running = job.spool.dir.join(format!("x{}", job_id));
    wait_for("job rename", Duration::from_secs(5), || running.exists());
    // The preset restore follows the rename, so the trap is in place.
    wait_for("preset restore", Duration::from_secs(5), || {
        log_lines(job)
            .iter()
            .filter(|line| **line == preset_restore)
            .count()
            > before
    });
    child
}

fn log_lines(job: &RealJob) -> Vec<String> {
    std::fs::read_to_string(&job.log)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

fn snapshot_files(job: &RealJob) -> Vec<PathBuf> {
    std::fs::read_dir(&job.snapdir)
        .expect("read snapshots")
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with("ffalarms."))
        })
        .collect()
}

#[test]
fn test_schedule_list_delete_round_trip() {
    let spool = spool();
    let _reader = make_fifo(&spool.dir.join(TRIGGER));
    let config = Arc::new(config(&spool));
    let clock = FakeClock::new(Utc.with_ymd_and_hms(2024, 6, 10, 7, 0, 0).unwrap());
    let emitter = JobEmitter::new(config.clone(), Arc::new(clock));
    let app = App::new((*config).clone());

    let alarm = emitter.schedule(8, 0, "cat /dev/null", 1).expect("schedule");
    let listed = app.registry().list_alarms().expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].job_id, alarm.job_id);
    assert_eq!(listed[0].timestamp, 1718006400);

    assert_eq!(app.controller.delete(&[alarm.job_id.clone()]), None);
    assert!(app.registry().list_alarms().expect("list").is_empty());
}

#[test]
fn test_kill_terminates_running_alarm() {
    let spool = spool();
    let app = App::new(config(&spool));
    let job_id = "1718002800.ffalarms.1";
    let mut child = start_fake_alarm(&spool.dir, job_id);

    assert!(app.registry().list_alarms().expect("list").is_empty());
    assert!(app.registry().list_running().expect("running").contains(job_id));

    assert!(app.controller.kill().expect("kill"));
    wait_exit(&mut child);
    assert!(!spool.dir.join(format!("x{}", job_id)).exists());

    // Nothing left to kill.
    assert!(!app.controller.kill().expect("kill"));
}

#[test]
fn test_delete_race_kills_firing_alarm() {
    let spool = spool();
    let app = App::new(config(&spool));
    let job_id = "1718002800.ffalarms.2";
    let mut child = start_fake_alarm(&spool.dir, job_id);

    // Listed while pending, deleted after it started firing.
    assert_eq!(app.controller.delete(&[job_id.to_string()]), None);
    wait_exit(&mut child);
}

#[test]
fn test_delete_race_without_process_reports_nothing_running() {
    let spool = spool();
    let app = App::new(config(&spool));
    let job_id = "1718002800.ffalarms.3";
    std::fs::write(spool.dir.join(job_id), format!("#!/bin/sh{}\n", MARKER)).expect("write");
    RenameFlag::new(spool.dir.clone())
        .transition(job_id)
        .expect("transition");

    assert_eq!(
        app.controller.delete(&[job_id.to_string()]).as_deref(),
        Some(NO_ALARM_RUNNING)
    );
}

#[test]
fn test_decoy_process_outside_spool_is_not_killed() {
    let spool = spool();
    let app = App::new(config(&spool));
    let job_id = "1718002800.ffalarms.4";

    // Same argv, but started from another directory.
    let elsewhere = spool.dir.with_file_name("elsewhere");
    std::fs::create_dir(&elsewhere).expect("mkdir");
    std::fs::write(elsewhere.join(job_id), "while :; do sleep 1; done\n").expect("write");
    let mut decoy = Command::new("/bin/sh")
        .arg(job_id)
        .current_dir(&elsewhere)
        .spawn()
        .expect("spawn decoy");
    std::fs::write(spool.dir.join(format!("x{}", job_id)), format!("#!/bin/sh{}\n", MARKER))
        .expect("write running file");

    let killed = app.controller.kill().expect("kill");
    let still_alive = decoy.try_wait().expect("try_wait").is_none();
    let _ = decoy.kill();
    let _ = decoy.wait();

    assert!(!killed);
    assert!(still_alive);
}

#[test]
fn test_state_flag_follows_job() {
    let spool = spool();
    let flag = RenameFlag::new(spool.dir.clone());
    let job_id = "1718002800.ffalarms.5";
    assert_eq!(flag.current_state(job_id), None);

    let mut child = start_fake_alarm(&spool.dir, job_id);
    assert_eq!(
        flag.current_state(job_id),
        Some(ffalarms::models::JobState::Running)
    );

    let app = App::new(config(&spool));
    assert!(app.controller.kill().expect("kill"));
    wait_exit(&mut child);
    assert_eq!(flag.current_state(job_id), None);
}

#[test]
fn test_real_job_restores_mixer_on_kill() {
    let job = real_job();
    let app = App::new(config(&job.spool));
    let job_id = "1718002800.ffalarms.6";
    let mut child = start_real_alarm(&job, job_id);

    let lines = log_lines(&job);
    let snapshot = lines[0]
        .strip_prefix("-f ")
        .and_then(|rest| rest.strip_suffix(" store"))
        .expect("first call stores the snapshot")
        .to_string();
    assert!(snapshot.starts_with(&format!("{}/ffalarms.{}.", job.snapdir.display(), job_id)));
    assert!(Path::new(&snapshot).exists());

    assert!(app.controller.kill().expect("kill"));
    wait_exit(&mut child);

    let lines = log_lines(&job);
    assert_eq!(
        lines.last().map(String::as_str),
        Some(format!("-f {} restore", snapshot).as_str())
    );
    assert!(!job.spool.dir.join(format!("x{}", job_id)).exists());
    assert!(!job.spool.dir.join(job_id).exists());
    assert!(snapshot_files(&job).is_empty(), "snapshot left behind");
}

#[test]
fn test_overlapping_job_reuses_first_snapshot() {
    let job = real_job();
    let app = App::new(config(&job.spool));
    let first = "1718002800.ffalarms.7";
    let second = "1718002800.ffalarms.8";
    let mut first_child = start_real_alarm(&job, first);
    let mut second_child = start_real_alarm(&job, second);

    let stores: Vec<String> = log_lines(&job)
        .into_iter()
        .filter(|line| line.ends_with(" store"))
        .collect();
    assert_eq!(stores.len(), 1, "second job stored again: {:?}", stores);
    assert!(stores[0].contains(&format!("/ffalarms.{}.", first)));

    let snapshots = snapshot_files(&job);
    assert_eq!(snapshots.len(), 2);

    assert!(app.controller.kill().expect("kill"));
    wait_exit(&mut first_child);
    wait_exit(&mut second_child);

    let restores: Vec<String> = log_lines(&job)
        .into_iter()
        .filter(|line| line.ends_with(" restore"))
        .collect();
    for snapshot in &snapshots {
        let line = format!("-f {} restore", snapshot.display());
        assert!(restores.contains(&line), "missing {:?} in {:?}", line, restores);
    }
    assert_eq!(restores.len(), 4);
    assert!(snapshot_files(&job).is_empty(), "snapshot left behind");
    assert!(app.registry().list_running().expect("running").is_empty());
}
