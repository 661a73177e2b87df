//! Test cases for the scripted [`LoopbackInterface`].

use rstest::*;

use specan_io::{InstrumentInterface, LoopbackInterface};

#[fixture]
fn emp_lbk() -> LoopbackInterface {
    LoopbackInterface::new("\n")
}

#[rstest]
fn finalize_empty(mut emp_lbk: LoopbackInterface) {
    emp_lbk.finalize();
}

#[rstest]
#[should_panic]
fn finalize_leftover_step() {
    let _lbk = LoopbackInterface::new("\n").expect_write("*CLS");
}

#[rstest]
fn sendcmd_in_order() {
    let mut lbk = LoopbackInterface::new("\n")
        .expect_write("*CLS")
        .expect_write("*ESE 1");
    lbk.sendcmd("*CLS").unwrap();
    assert_eq!(lbk.remaining(), 1);
    lbk.sendcmd("*ESE 1").unwrap();
}

#[rstest]
#[should_panic]
fn sendcmd_out_of_order() {
    let mut lbk = LoopbackInterface::new("\n")
        .expect_write("*CLS")
        .expect_write("*ESE 1");
    lbk.sendcmd("*ESE 1").unwrap();
}

#[rstest]
fn query_in_order() {
    let mut lbk = LoopbackInterface::new("\n")
        .expect_query("*IDN?", "Acme,SA-26,100123,1.2.3")
        .expect_query("*OPT?", "K7,B25");
    assert_eq!(lbk.query("*IDN?").unwrap(), "Acme,SA-26,100123,1.2.3");
    assert_eq!(lbk.query("*OPT?").unwrap(), "K7,B25");
}

/// Reading without a preceding query is a timeout, not a panic.
#[rstest]
fn read_without_query(mut emp_lbk: LoopbackInterface) {
    assert!(emp_lbk.read_until_terminator().is_err());
}

#[rstest]
fn status_polls() {
    let mut lbk = LoopbackInterface::new("\n")
        .expect_status_polls(2, 0)
        .expect_query("*STB?", "32");
    assert_eq!(lbk.read_status_byte().unwrap(), 0);
    assert_eq!(lbk.read_status_byte().unwrap(), 0);
    assert_eq!(lbk.read_status_byte().unwrap(), 32);
}

#[rstest]
fn binary_block() {
    let mut lbk = LoopbackInterface::new("\n").expect_block("TRAC:DATA? TRACE1", b"\x01\x02\n\x03");
    lbk.sendcmd("TRAC:DATA? TRACE1").unwrap();
    assert_eq!(lbk.read_binary_block().unwrap(), b"\x01\x02\n\x03".to_vec());
}

#[rstest]
fn terminator(mut emp_lbk: LoopbackInterface) {
    emp_lbk.test_terminator("\n");
    emp_lbk.set_terminator("\r\n");
    emp_lbk.test_terminator("\r\n");
}

/// A driver that switches to CR/LF must be scripted with CR/LF.
#[rstest]
fn crlf_terminator() {
    let mut lbk = LoopbackInterface::new("\r\n").expect_query("*STB?", "0");
    lbk.set_terminator("\r\n");
    assert_eq!(lbk.read_status_byte().unwrap(), 0);
}

#[rstest]
fn append_keeps_order() {
    let tail = LoopbackInterface::new("\n").expect_query("FREQ:SPAN?", "1000");
    let mut lbk = LoopbackInterface::new("\n")
        .expect_write("*CLS")
        .append(tail);
    assert_eq!(lbk.remaining(), 2);
    lbk.sendcmd("*CLS").unwrap();
    assert_eq!(lbk.query("FREQ:SPAN?").unwrap(), "1000");
}
