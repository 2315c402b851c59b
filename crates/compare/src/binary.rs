//! Bytewise file comparison with an adaptive buffer.

use std::time::{Duration, Instant};

use status::ProcessCallback;
use vfs::{AbstractPath, FileError};

const BUFFER_MIN: usize = 128 * 1024;
const BUFFER_START: usize = 512 * 1024;
const BUFFER_MAX: usize = 16 * 1024 * 1024;

/// Keep each read cycle between these bounds so the progress callback
/// stays responsive without sacrificing throughput.
const CYCLE_TARGET_MIN: Duration = Duration::from_millis(200);
const CYCLE_TARGET_MAX: Duration = Duration::from_millis(500);
/// Cooldown before growing again, to avoid flipping when a device serves
/// one large burst quickly (optical media read-ahead).
const RESIZE_COOLDOWN: Duration = Duration::from_secs(2);

struct BufferSize {
    len: usize,
}

impl BufferSize {
    fn new() -> Self {
        Self { len: BUFFER_START }
    }

    fn inc(&mut self) {
        if self.len < BUFFER_MAX {
            self.len *= 2;
        }
    }

    fn dec(&mut self) {
        if self.len > BUFFER_MIN {
            self.len /= 2;
        }
    }
}

fn fill(
    stream: &mut dyn vfs::InputStream,
    buf: &mut [u8],
) -> Result<usize, FileError> {
    let mut filled = 0;
    while filled < buf.len() {
        let read = stream.read(&mut buf[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    Ok(filled)
}

/// Streams both files in lockstep and reports compared bytes through the
/// callback.
///
/// Returns `false` on the first length or content mismatch. The callback's
/// refresh poll makes every cycle an abort point.
pub fn files_have_same_content(
    left: &AbstractPath,
    right: &AbstractPath,
    callback: &mut dyn ProcessCallback,
) -> Result<bool, FileError> {
    let mut stream_left = left.device.open_input(&left.path)?;
    let mut stream_right = right.device.open_input(&right.path)?;

    let mut buffer_size = BufferSize::new();
    let mut buf_left = vec![0u8; BUFFER_START];
    let mut buf_right = vec![0u8; BUFFER_START];
    let mut last_resize = Instant::now();

    loop {
        let cycle_start = Instant::now();
        let len = buffer_size.len;
        if buf_left.len() < len {
            buf_left.resize(len, 0);
            buf_right.resize(len, 0);
        }
        let read_left = fill(stream_left.as_mut(), &mut buf_left[..len])?;
        let read_right = fill(stream_right.as_mut(), &mut buf_right[..len])?;
        let cycle = cycle_start.elapsed();

        if cycle < CYCLE_TARGET_MIN && cycle_start.duration_since(last_resize) > RESIZE_COOLDOWN {
            last_resize = cycle_start;
            buffer_size.inc();
        } else if cycle > CYCLE_TARGET_MAX {
            last_resize = cycle_start;
            buffer_size.dec();
        }

        if read_left != read_right || buf_left[..read_left] != buf_right[..read_right] {
            return Ok(false);
        }

        callback.update_progress(0, 2 * read_left as i64);
        callback.request_ui_refresh()?;

        if read_left < len {
            // end of both files
            return Ok(true);
        }
    }
}
