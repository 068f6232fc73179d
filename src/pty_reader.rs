use std::io::{self, Read};
use std::sync::mpsc::{Receiver, channel};
use std::thread;

/// Spawns a background thread that reads the PTY in chunks of at most
/// `chunk_size` bytes.
///
/// The channel disconnects on EOF. Any other read error is forwarded once and
/// ends the thread. On Linux the PTY master reports `EIO` once the last
/// holder of the subordinate side is gone; that is mapped to EOF.
///
/// The thread is never joined: it may stay blocked in `read` for as long as a
/// grandchild keeps the PTY open.
pub fn spawn_reader<R: Read + Send + 'static>(
    mut reader: R,
    chunk_size: usize,
) -> Receiver<io::Result<Vec<u8>>> {
    let (tx, rx) = channel();

    thread::spawn(move || {
        let mut buffer = vec![0u8; chunk_size.max(1)];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break, // EOF
                Ok(n) => {
                    if tx.send(Ok(buffer[..n].to_vec())).is_err() {
                        break; // Receiver dropped
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_hangup(&e) => break,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        }
    });

    rx
}

fn is_hangup(err: &io::Error) -> bool {
    // EIO
    err.raw_os_error() == Some(5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_chunks_are_bounded() {
        let rx = spawn_reader(Cursor::new(vec![b'x'; 600]), 256);
        let sizes: Vec<usize> = rx.iter().map(|chunk| chunk.unwrap().len()).collect();
        assert_eq!(sizes, vec![256, 256, 88]);
    }

    #[test]
    fn test_eof_disconnects() {
        let rx = spawn_reader(Cursor::new(Vec::new()), 256);
        assert!(rx.recv().is_err());
    }

    struct Failing;

    impl Read for Failing {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "nope"))
        }
    }

    #[test]
    fn test_error_is_forwarded_once() {
        let rx = spawn_reader(Failing, 256);
        assert!(rx.recv().unwrap().is_err());
        assert!(rx.recv().is_err());
    }

    struct HungUp;

    impl Read for HungUp {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::from_raw_os_error(5))
        }
    }

    #[test]
    fn test_eio_is_eof() {
        let rx = spawn_reader(HungUp, 256);
        assert!(rx.recv().is_err());
    }
}
