//! Shell-script stand-ins for the fetch and transcode tools.
//!
//! Each script is written into the test's scratch dir with its behaviour baked
//! in, so tests running in parallel never share state. The fake fetch tool
//! appends its argv to `fetch.log` (one line per invocation, probe runs
//! excluded) and writes `<-o template with %(ext)s = webm>`. A query
//! containing `FAIL` makes any mode exit 1.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Prints 10%, 50%, 100% and writes the file.
    Ok,
    /// Like `Ok` but sleeps `millis` first (keeps a job inside the gate).
    Slow { millis: u32 },
    /// First invocation prints 10% then 40% and hangs in a background
    /// `sleep` whose pid goes to `fetch.sleep.pid`; later ones finish.
    StallOnce,
    /// Prints an error on stderr and exits 1.
    Fail,
    /// Exits 0 without writing anything.
    NoFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscodeMode {
    /// Prints Duration/time markers and writes the output.
    Ok,
    /// Prints the markers and exits 1 without output.
    Fail,
}

/// Written by the stalled `StallOnce` run.
pub const SLEEP_PID_FILE: &str = "fetch.sleep.pid";

const PARSE_ARGS: &str = r#"
out=""
probe=0
query=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    --dump-json) probe=1; shift ;;
    --) query="$2"; break ;;
    *) shift ;;
  esac
done
"#;

pub fn write_fetch_tool(dir: &Path, mode: FetchMode) -> PathBuf {
    let log = dir.join("fetch.log");
    let count = dir.join("fetch.count");
    let sleep_pid = dir.join(SLEEP_PID_FILE);
    let body = match mode {
        FetchMode::Ok => r#"
echo "[download]  10.0% of 1.00MiB"
echo "[download]  50.0% of 1.00MiB"
echo "[download] 100.0% of 1.00MiB"
printf 'media' > "$file"
"#
        .to_string(),
        FetchMode::Slow { millis } => format!(
            r#"
sleep {}
echo "[download]  50.0% of 1.00MiB"
echo "[download] 100.0% of 1.00MiB"
printf 'media' > "$file"
"#,
            f64::from(millis) / 1000.0
        ),
        FetchMode::StallOnce => format!(
            r#"
n=0
[ -f "{count}" ] && n=$(cat "{count}")
n=$((n + 1))
echo "$n" > "{count}"
printf 'partial' > "$file.part"
if [ "$n" -eq 1 ]; then
  sleep 30 &
  echo $! > "{sleep_pid}"
fi
echo "[download]  10.0% of 1.00MiB"
echo "[download]  40.0% of 1.00MiB"
if [ "$n" -eq 1 ]; then
  wait $!
fi
echo "[download] 100.0% of 1.00MiB"
rm -f "$file.part"
printf 'media' > "$file"
"#,
            count = count.display(),
            sleep_pid = sleep_pid.display()
        ),
        FetchMode::Fail => r#"
echo "[youtube] probing"
echo "ERROR: Video unavailable" >&2
exit 1
"#
        .to_string(),
        FetchMode::NoFile => r#"
echo "[download] 100.0% of 1.00MiB"
"#
        .to_string(),
    };
    let script = format!(
        r#"#!/bin/sh
argv="$*"
{PARSE_ARGS}
if [ "$probe" -eq 1 ]; then
  echo '{{"title":"Probed","album":"Probe Album","genre":"Probe Genre","release_year":2001}}'
  exit 0
fi
echo "$argv" >> "{log}"
case "$query" in
  *FAIL*) echo "ERROR: Video unavailable" >&2; exit 1 ;;
esac
file=$(printf '%s' "$out" | sed 's/%(ext)s/webm/')
{body}
exit 0
"#,
        log = log.display(),
    );
    install(dir, "fake-yt-dlp", &script)
}

pub fn write_transcode_tool(dir: &Path, mode: TranscodeMode) -> PathBuf {
    let log = dir.join("transcode.log");
    let tail = match mode {
        TranscodeMode::Ok => r#"cp "$in" "$last""#,
        TranscodeMode::Fail => r#"echo "Conversion failed!" >&2; exit 1"#,
    };
    let script = format!(
        r#"#!/bin/sh
echo "$*" >> "{log}"
in=""
prev=""
for a in "$@"; do
  [ "$prev" = "-i" ] && in="$a"
  prev="$a"
  last="$a"
done
echo "Input #0, webm, from '$in':" >&2
echo "  Duration: 00:01:00.00, start: 0.000000, bitrate: 128 kb/s" >&2
printf 'size=     256kB time=00:00:30.00 bitrate= 69.9kbits/s speed=60x\r' >&2
printf 'size=     512kB time=00:01:00.00 bitrate= 69.9kbits/s speed=60x\n' >&2
{tail}
exit 0
"#,
        log = log.display(),
    );
    install(dir, "fake-ffmpeg", &script)
}

/// Lines of a tool's argv log (empty if it never ran).
pub fn read_log(dir: &Path, name: &str) -> Vec<String> {
    std::fs::read_to_string(dir.join(name))
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Pid of the helper the stalled fetch is waiting on.
pub fn sleep_pid(dir: &Path) -> Option<u32> {
    std::fs::read_to_string(dir.join(SLEEP_PID_FILE))
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

/// True while `pid` exists and is not a zombie awaiting its reaper.
pub fn process_alive(pid: u32) -> bool {
    let proc_root = Path::new("/proc");
    if proc_root.is_dir() {
        return match std::fs::read_to_string(proc_root.join(pid.to_string()).join("stat")) {
            // state is the first field after the parenthesised command name
            Ok(stat) => stat
                .rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next())
                .map(|state| state != "Z" && state != "X")
                .unwrap_or(false),
            Err(_) => false,
        };
    }
    std::process::Command::new("sh")
        .args(["-c", &format!("kill -0 {pid} 2>/dev/null")])
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn install(dir: &Path, name: &str, script: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
