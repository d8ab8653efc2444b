//! The shell script every alarm job runs as.
//!
//! The script is executed by `atd` as `/bin/sh NAME` with the spool
//! directory as working directory. It owns the whole firing behavior:
//! mixer snapshot, self-rename, notifying the watcher, volume ramp,
//! repeated playback and cleanup on SIGTERM.

use crate::models::config::shell_quote;

/// Bytes that identify a spool file as one of ours.
pub const MARKER: &str = "\n##ffalarms##";

/// The marker must appear within this many leading bytes of a job file.
pub const MARKER_WINDOW: usize = 30;

const TEMPLATE: &str = r#"#!/bin/sh
##ffalarms##
# alarm job generated by ffalarms; removing it cancels the alarm

cd "$(dirname "$0")" || exit 1
NAME=$(basename "$0")
PRESET=@MIXER_PRESET@
SNAPDIR=${TMPDIR:-/tmp}
RAMP_PID=
PLAYER_PID=
SNAPSHOT=$(mktemp "$SNAPDIR/ffalarms.$NAME.$$.XXXXXX") || exit 1

COPIED=
for RUNNING in x*.ffalarms.*; do
    [ -f "$RUNNING" ] || continue
    SIBLING=${RUNNING#x}
    for OLD in "$SNAPDIR/ffalarms.$SIBLING".*; do
        [ -f "$OLD" ] || continue
        OLD_PID=${OLD#"$SNAPDIR/ffalarms.$SIBLING."}
        OLD_PID=${OLD_PID%%.*}
        if kill -0 "$OLD_PID" 2>/dev/null && cp "$OLD" "$SNAPSHOT"; then
            COPIED=1
            break 2
        fi
    done
done
[ -n "$COPIED" ] || @STATE_TOOL@ -f "$SNAPSHOT" store

cleanup() {
    [ -n "$RAMP_PID" ] && kill "$RAMP_PID" 2>/dev/null
    [ -n "$PLAYER_PID" ] && kill "$PLAYER_PID" 2>/dev/null
    wait
    @STATE_TOOL@ -f "$SNAPSHOT" restore
    rm -f "$NAME" "x$NAME" "$SNAPSHOT"
    exit 0
}
trap cleanup TERM

mv "$NAME" "x$NAME"

@APP@ notify || { DISPLAY=${DISPLAY:-:0} @APP@ prompt & }

@STATE_TOOL@ -f "$PRESET" restore
@MIXER_TOOL@ --quiet sset @MIXER_CONTROL@ @VOLUME_START@
VOL=@VOLUME_START@
while [ "$VOL" -le @VOLUME_END@ ]; do
    echo sset @MIXER_CONTROL@ "$VOL" || break
    VOL=$((VOL + 1))
    sleep 1
done | @MIXER_TOOL@ --stdin --quiet &
RAMP_PID=$!

i=0
while [ "$i" -lt @REPEAT@ ]; do
    @ALARM_CMD@ &
    PLAYER_PID=$!
    wait "$PLAYER_PID"
    PLAYER_PID=
    i=$((i + 1))
done

cleanup
"#;

/// Values substituted into the job script.
#[derive(Debug, Clone)]
pub struct ScriptParams {
    /// Player command, already shell-ready (file argument quoted).
    pub alarm_cmd: String,
    pub repeat: u32,
    pub mixer_preset: String,
    pub state_tool: String,
    pub mixer_tool: String,
    pub mixer_control: String,
    pub volume_start: u32,
    pub volume_end: u32,
    /// Shell-ready command that invokes this program.
    pub app: String,
}

/// Render the job script for `params`.
pub fn render(params: &ScriptParams) -> String {
    TEMPLATE
        .replace("@MIXER_PRESET@", &shell_quote(&params.mixer_preset))
        .replace("@STATE_TOOL@", &shell_quote(&params.state_tool))
        .replace("@MIXER_TOOL@", &shell_quote(&params.mixer_tool))
        .replace("@MIXER_CONTROL@", &shell_quote(&params.mixer_control))
        .replace("@VOLUME_START@", &params.volume_start.to_string())
        .replace("@VOLUME_END@", &params.volume_end.to_string())
        .replace("@REPEAT@", &params.repeat.to_string())
        .replace("@APP@", &params.app)
        .replace("@ALARM_CMD@", &params.alarm_cmd)
}

/// Whether `head` (the leading bytes of a file) carries the marker.
pub fn has_marker(head: &[u8]) -> bool {
    let window = &head[..head.len().min(MARKER_WINDOW)];
    window
        .windows(MARKER.len())
        .any(|w| w == MARKER.as_bytes())
}

/// Abort if the template no longer carries the marker where scans look for
/// it. Every job written without it would be invisible to list and kill.
pub fn assert_marker_window() {
    if !has_marker(TEMPLATE.as_bytes()) {
        panic!(
            "job script template lost its marker {:?} within the first {} bytes",
            MARKER, MARKER_WINDOW
        );
    }
}
