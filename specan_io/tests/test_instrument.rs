//! Tests for the generic [`Instrument`] interface and the default trait methods.

use std::{
    collections::VecDeque,
    io::{Read, Write},
    time::Duration,
};

use rstest::*;

use specan_io::{Instrument, InstrumentError, InstrumentInterface, encode_block};

/// A port that serves scripted bytes on read and records everything written to it.
#[derive(Default)]
struct TestPort {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
}

impl Read for TestPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.rx.read(buf)
    }
}

impl Write for TestPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.tx.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

type DequeInst = Instrument<TestPort>;

/// Instrument whose port already holds the given bytes to read.
fn crt_inst(pending: &[u8]) -> DequeInst {
    let port = TestPort {
        rx: VecDeque::from(pending.to_vec()),
        tx: Vec::new(),
    };
    Instrument::new(port, Duration::from_secs(3))
}

#[fixture]
fn empt_inst() -> DequeInst {
    crt_inst(&[])
}

#[rstest]
fn test_terminator(mut empt_inst: DequeInst) {
    assert_eq!(empt_inst.get_terminator(), "\n");
    empt_inst.set_terminator("\r\n");
    assert_eq!(empt_inst.get_terminator(), "\r\n");
}

#[rstest]
fn test_timeout_get_set(mut empt_inst: DequeInst) {
    assert_eq!(empt_inst.get_timeout(), Duration::from_secs(3));
    empt_inst.set_timeout(Duration::from_millis(250)).unwrap();
    assert_eq!(empt_inst.get_timeout(), Duration::from_millis(250));
}

#[rstest]
fn test_sendcmd_appends_terminator(mut empt_inst: DequeInst) {
    empt_inst.sendcmd("*CLS").unwrap();
    assert_eq!(empt_inst.into_inner().tx, b"*CLS\n".to_vec());
}

#[rstest]
fn test_read_line_strips_terminator() {
    let mut inst = crt_inst(b" 1.5E9 \n");
    assert_eq!(inst.read_until_terminator().unwrap(), "1.5E9");
}

/// Reading from an exhausted port is reported as a timeout, and a query names the command.
#[rstest]
fn test_query_timeout() {
    let mut inst = crt_inst(b"resp");
    match inst.query("FREQ:CENT?") {
        Err(InstrumentError::TimeoutQuery { query, timeout }) => {
            assert_eq!(query, "FREQ:CENT?");
            assert_eq!(timeout, Duration::from_secs(3));
        }
        other => panic!("Expected a query timeout, got {other:?}"),
    }
}

#[rstest]
#[case(b"#14abcd\n".to_vec(), b"abcd".to_vec())]
#[case(b"#0xyz\n".to_vec(), b"xyz".to_vec())]
#[case(b"#10\n".to_vec(), vec![])]
fn test_read_binary_block(#[case] raw: Vec<u8>, #[case] expected: Vec<u8>) {
    let mut inst = crt_inst(&raw);
    assert_eq!(inst.read_binary_block().unwrap(), expected);
}

/// A block containing the terminator byte is read by length, not by terminator.
#[rstest]
fn test_read_binary_block_with_embedded_newline() {
    let data = [0x0a, 0x00, 0x0a, 0xff];
    let mut raw = encode_block(&data);
    raw.push(b'\n');
    let mut inst = crt_inst(&raw);
    assert_eq!(inst.read_binary_block().unwrap(), data.to_vec());
    assert!(inst.into_inner().rx.is_empty());
}

#[rstest]
#[case(b"14abcd\n".to_vec())]
#[case(b"#a4abcd\n".to_vec())]
#[case(b"#2x4abcd\n".to_vec())]
#[case(b"#9999999999\n".to_vec())]
fn test_read_binary_block_invalid(#[case] raw: Vec<u8>) {
    let mut inst = crt_inst(&raw);
    assert!(matches!(
        inst.read_binary_block(),
        Err(InstrumentError::InvalidBinaryBlock(_))
    ));
}

/// The default status byte read goes through `*STB?`.
#[rstest]
fn test_read_status_byte_default() {
    let mut inst = crt_inst(b"36\n");
    assert_eq!(inst.read_status_byte().unwrap(), 36);
    assert_eq!(inst.into_inner().tx, b"*STB?\n".to_vec());
}

#[rstest]
fn test_read_status_byte_unparsable() {
    let mut inst = crt_inst(b"busy\n");
    assert!(matches!(
        inst.read_status_byte(),
        Err(InstrumentError::ResponseParseError(resp)) if resp == "busy"
    ));
}
