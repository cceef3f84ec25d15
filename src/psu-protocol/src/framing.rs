// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Largest JSON line either side accepts.
pub const MAX_LINE_BYTES: usize = 16 * 1024;

fn utf8_line(line: Vec<u8>) -> std::io::Result<String> {
    String::from_utf8(line).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("line is not valid UTF-8: {e}"),
        )
    })
}

/// Read one `\n`-terminated line of at most `max_bytes`.
///
/// Returns `Ok(None)` on a clean EOF before any byte of a new line.
/// An overlong line fails with `InvalidData` and leaves the stream
/// mid-line. A complete line that is not UTF-8 fails with `InvalidInput`
/// after being consumed, so the next line can still be read.
pub async fn read_limited_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    max_bytes: usize,
) -> std::io::Result<Option<String>> {
    let mut line = Vec::with_capacity(256);
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            if line.is_empty() {
                return Ok(None);
            }
            return utf8_line(line).map(Some);
        }

        if let Some(pos) = available.iter().position(|b| *b == b'\n') {
            let chunk = &available[..=pos];
            if line.len() + chunk.len() > max_bytes {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("line exceeds maximum size of {max_bytes} bytes"),
                ));
            }
            line.extend_from_slice(chunk);
            reader.consume(pos + 1);
            return utf8_line(line).map(Some);
        }

        let len = available.len();
        if line.len() + len > max_bytes {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("line exceeds maximum size of {max_bytes} bytes"),
            ));
        }
        line.extend_from_slice(available);
        reader.consume(len);
    }
}
