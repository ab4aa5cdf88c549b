// Audiobook Processor - folder to chaptered M4B converter
// Copyright (C) 2026 The Audiobook Processor Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Stand-in ffmpeg/ffprobe scripts for subprocess tests
//!
//! Scripts are written once per test binary. Writing an executable while
//! another test thread forks can make exec fail with ETXTBSY, so nothing is
//! written after the first spawn.
//!
//! Fake ffmpeg behavior, keyed on its arguments:
//! - two `-i` inputs (embed): copies the second input (the ffmetadata file) to the output
//! - `-f concat`: copies the concat manifest to the output
//! - otherwise: writes `fake-m4b` to the output
//!
//! Fake ffprobe reports the first line of the probed file as its duration.

use crate::config::{ProcessorOptions, ToolPaths};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tempfile::TempDir;

const FFMPEG_OK: &str = r#"#!/bin/sh
out=""
first=""
second=""
concat=0
prev=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then
    if [ -z "$first" ]; then first="$arg"; else second="$arg"; fi
  fi
  if [ "$prev" = "-f" ] && [ "$arg" = "concat" ]; then concat=1; fi
  prev="$arg"
  out="$arg"
done
printf 'ffmpeg version fake\n' >&2
printf 'size=       1kB time=00:00:05.00 bitrate=   1.6kbits/s speed=10x\r' >&2
printf 'size=       2kB time=N/A bitrate=N/A speed=N/A\r' >&2
if [ -n "$second" ]; then
  cat "$second" > "$out"
elif [ "$concat" = 1 ]; then
  cat "$first" > "$out"
else
  printf 'fake-m4b' > "$out"
fi
printf 'video:0kB audio:2kB subtitle:0kB\n' >&2
exit 0
"#;

const FFMPEG_FAIL: &str = r#"#!/bin/sh
printf 'ffmpeg version fake\n' >&2
printf 'Invalid data found when processing input\n' >&2
exit 3
"#;

const FFMPEG_KILLED: &str = r#"#!/bin/sh
kill -9 $$
"#;

const FFPROBE_OK: &str = r#"#!/bin/sh
for arg in "$@"; do in="$arg"; done
dur=$(head -n 1 "$in" 2>/dev/null)
[ -n "$dur" ] || dur="0"
printf '{"format":{"format_name":"mp3","duration":"%s","tags":{"title":"Book","artist":"Author","composer":"Narrator"}}}\n' "$dur"
"#;

const FFPROBE_EMPTY: &str = "#!/bin/sh\nexit 0\n";

pub(crate) struct FakeTools {
    dir: TempDir,
}

impl FakeTools {
    fn script(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Tools that succeed
    pub fn ok(&self) -> ToolPaths {
        ToolPaths::new(self.script("ffmpeg-ok"), self.script("ffprobe-ok"))
    }

    /// ffmpeg exits 3 with a diagnostic line
    pub fn failing_ffmpeg(&self) -> ToolPaths {
        ToolPaths::new(self.script("ffmpeg-fail"), self.script("ffprobe-ok"))
    }

    /// ffmpeg is terminated by SIGKILL
    pub fn killed_ffmpeg(&self) -> ToolPaths {
        ToolPaths::new(self.script("ffmpeg-killed"), self.script("ffprobe-ok"))
    }

    /// ffprobe exits 0 without output
    pub fn empty_ffprobe(&self) -> ToolPaths {
        ToolPaths::new(self.script("ffmpeg-ok"), self.script("ffprobe-empty"))
    }

    /// Paths that do not exist
    pub fn missing(&self) -> ToolPaths {
        ToolPaths::new(self.script("no-such-ffmpeg"), self.script("no-such-ffprobe"))
    }
}

pub(crate) fn fake_tools() -> &'static FakeTools {
    static TOOLS: OnceLock<FakeTools> = OnceLock::new();

    TOOLS.get_or_init(|| {
        let dir = TempDir::new().unwrap();
        for (name, body) in [
            ("ffmpeg-ok", FFMPEG_OK),
            ("ffmpeg-fail", FFMPEG_FAIL),
            ("ffmpeg-killed", FFMPEG_KILLED),
            ("ffprobe-ok", FFPROBE_OK),
            ("ffprobe-empty", FFPROBE_EMPTY),
        ] {
            let path = dir.path().join(name);
            fs::write(&path, body).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        }
        FakeTools { dir }
    })
}

/// Options using `tools`, with scratch dirs under `scratch_root`
pub(crate) fn options(tools: ToolPaths, scratch_root: &Path) -> ProcessorOptions {
    let mut options = ProcessorOptions::with_tools(tools);
    options.scratch_root = Some(scratch_root.to_path_buf());
    options
}

/// Write an "audio" file whose content the fake prober reads as its duration
pub(crate) fn write_audio(path: &Path, seconds: u64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, format!("{}\n", seconds)).unwrap();
}
