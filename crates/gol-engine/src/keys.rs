//! Key-press source for the controller.
//!
//! Keys are read from standard input, one line at a time; every
//! non-whitespace character of a line is delivered as one key press. The
//! channel closes at end of input.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Capacity of the key channel.
const KEY_BUFFER: usize = 16;

/// Start reading key presses from standard input.
pub fn spawn_stdin_keys() -> mpsc::Receiver<char> {
    spawn_key_reader(BufReader::new(tokio::io::stdin()))
}

/// Start reading key presses from `reader`.
pub fn spawn_key_reader<R>(reader: R) -> mpsc::Receiver<char>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(KEY_BUFFER);
    tokio::spawn(async move {
        let mut lines = reader.lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    for key in line.chars().filter(|c| !c.is_whitespace()) {
                        if tx.send(key).await.is_err() {
                            return;
                        }
                    }
                }
                Ok(None) => {
                    debug!("Key input closed");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Key input failed");
                    return;
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_character_is_a_key() {
        let mut rx = spawn_key_reader(&b"p\n s q \n\nk"[..]);
        let mut keys = Vec::new();
        while let Some(key) = rx.recv().await {
            keys.push(key);
        }
        assert_eq!(keys, vec!['p', 's', 'q', 'k']);
    }
}
