//! File channel scenarios driven through the public API.

use chanio::channel::{
    read_all, Channel, DirectFile, FileFlags, ReadChannel, SeqReadFile, SeqWriteFile,
    WriteAtChannel, WriteChannel, UNLIMITED,
};
use chanio::{block_on, Error, FixedBuffer};
use std::io::Write as _;
use std::sync::Once;

const CREATE: FileFlags = FileFlags::CREATE_NEW.add(FileFlags::OPEN_EXISTING);

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();
    });
}

#[test]
fn megabyte_read_in_kilobyte_chunks() {
    init_logging();

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("large");
    let contents: Vec<u8> = (0..1024 * 1024).map(|i| (i % 251) as u8).collect();
    std::fs::File::create(&path)
        .and_then(|mut f| f.write_all(&contents))
        .expect("seed file");

    block_on(async {
        let mut channel = SeqReadFile::new();
        channel
            .async_open(&path, FileFlags::NONE)
            .await
            .expect("open");

        let mut total = 0usize;
        let mut collected = Vec::with_capacity(contents.len());
        let mut buf = [0u8; 1024];
        loop {
            match channel.async_read_some(&mut buf).await {
                Ok(n) => {
                    assert!(n > 0, "successful reads are strictly positive");
                    collected.extend_from_slice(&buf[..n]);
                    total += n;
                }
                Err(err) if err.is_eof() => break,
                Err(err) => panic!("unexpected error: {err}"),
            }
        }

        assert_eq!(total, contents.len());
        assert_eq!(collected, contents);

        channel.async_close().await.expect("close");
    });
}

#[test]
fn concurrent_reader_and_writer_on_one_path() {
    init_logging();

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("shared");

    // Open both channels up front, write through one, read through the
    // other.
    let mut writer = SeqWriteFile::new();
    writer.open(&path, CREATE).expect("open writer");

    let mut reader = SeqReadFile::new();
    reader.open(&path, FileFlags::NONE).expect("open reader");

    assert_eq!(writer.write_some(b"hello").expect("write"), 5);
    writer.close().expect("close writer");

    let mut buf = [0u8; 16];
    assert_eq!(reader.read_some(&mut buf).expect("read"), 5);
    assert_eq!(&buf[..5], b"hello");
    assert!(reader.read_some(&mut buf).expect_err("eof").is_eof());
    reader.close().expect("close reader");
}

#[test]
fn invalid_flags_leave_channel_closed() {
    init_logging();

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("flags");
    std::fs::write(&path, b"x").expect("seed");

    let mut channel = SeqReadFile::new();
    let err = channel
        .open(&path, FileFlags::WRITE | FileFlags::READ)
        .expect_err("read shape rejects write");
    assert!(matches!(err, Error::InvalidFlags));
    assert!(!channel.is_open());

    // The channel is still usable afterwards.
    channel.open(&path, FileFlags::NONE).expect("open");
    channel.close().expect("close");
}

#[test]
fn direct_write_then_algorithm_read_back() {
    init_logging();

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("algo");

    let mut direct = DirectFile::new();
    direct.open(&path, CREATE).expect("open");
    assert_eq!(direct.write_some_at(0, b"buffered algorithms").expect("write"), 19);
    direct.close().expect("close");

    let mut reader = SeqReadFile::new();
    reader.open(&path, FileFlags::NONE).expect("open");

    let mut buffer = FixedBuffer::with_capacity(64);
    let (total, result) = read_all(&mut reader, &mut buffer, UNLIMITED);
    assert_eq!(total, 19);
    assert!(result.expect_err("stream ends").is_eof());
    assert_eq!(buffer.readable(), b"buffered algorithms");

    reader.close().expect("close");
}

#[test]
fn append_channel_grows_existing_file() {
    init_logging();

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("log");
    std::fs::write(&path, b"line1\n").expect("seed");

    block_on(async {
        let mut channel = SeqWriteFile::new();
        channel
            .async_open(&path, FileFlags::OPEN_EXISTING | FileFlags::APPEND)
            .await
            .expect("open");
        assert_eq!(channel.async_write_some(b"line2\n").await.expect("write"), 6);
        channel.async_close().await.expect("close");
    });

    assert_eq!(std::fs::read(&path).expect("read back"), b"line1\nline2\n");
}
