//! Exact conversations of the session core, checked against a scripted loopback interface.

use std::time::Duration;

use rstest::*;

use specan::*;
use specan_io::LoopbackInterface;

const IDN: &str = "Acme,SA-26,100123,1.2.3";

/// Script of a default initialization without reset.
fn init_script() -> LoopbackInterface {
    LoopbackInterface::new("\n")
        .expect_query("*IDN?", IDN)
        .expect_query("*OPT?", "B25,K7")
        .expect_write("*CLS")
        .expect_write("*ESE 1")
        .expect_status_polls(1, 0)
}

fn open(script: LoopbackInterface) -> Session<LoopbackInterface> {
    Session::init(script, SessionOptions::default()).unwrap()
}

#[rstest]
fn test_init_default() {
    let session = open(init_script());
    let idn = session.identity().unwrap().unwrap();
    assert_eq!(idn.manufacturer, "Acme");
    assert_eq!(idn.model, "SA-26");
    assert_eq!(session.installed_options().unwrap(), vec!["B25", "K7"]);
    assert!(!session.is_simulated().unwrap());
}

#[rstest]
fn test_init_without_id_query() {
    let script = LoopbackInterface::new("\n")
        .expect_query("*OPT?", "0")
        .expect_write("*CLS")
        .expect_write("*ESE 1")
        .expect_status_polls(1, 0);
    let opts = SessionOptions::default().with_id_query(false);
    let session = Session::init(script, opts).unwrap();
    assert_eq!(session.identity().unwrap(), None);
    assert!(session.installed_options().unwrap().is_empty());
}

/// With reset, `*RST` is synchronized with operation complete and followed by the status check.
#[rstest]
fn test_init_with_reset() {
    let script = LoopbackInterface::new("\n")
        .expect_query("*IDN?", IDN)
        .expect_query("*OPT?", "B25")
        .expect_write("*CLS")
        .expect_write("*ESE 1")
        .expect_write("*RST;*OPC")
        .expect_status_polls(2, 0)
        .expect_status_polls(1, StatusByte::EVENT_STATUS)
        .expect_query("*ESR?", "1")
        .expect_status_polls(1, 0);
    let opts = SessionOptions::default().with_reset(true);
    Session::init(script, opts).unwrap();
}

#[rstest]
fn test_init_crlf_terminator() {
    let script = LoopbackInterface::new("\r\n")
        .expect_query("*IDN?", IDN)
        .expect_query("*OPT?", "0")
        .expect_write("*CLS")
        .expect_write("*ESE 1")
        .expect_status_polls(1, 0);
    let opts = SessionOptions::default().with_terminator("\r\n");
    Session::init(script, opts).unwrap();
}

#[rstest]
fn test_init_bad_identity() {
    let script = LoopbackInterface::new("\n").expect_query("*IDN?", "garbage");
    let err = Session::init(script, SessionOptions::default()).err().unwrap();
    assert!(matches!(err, SpecanError::Protocol { .. }));
}

/// Every checked write is followed by exactly one status poll.
#[rstest]
fn test_write_checks_status() {
    let script = init_script()
        .expect_write("FREQ:CENT 1000000000")
        .expect_status_polls(1, 0)
        .expect_query("FREQ:CENT?", "1000000000")
        .expect_status_polls(1, 0);
    let session = open(script);
    session.write("FREQ:CENT 1000000000").unwrap();
    let hz: f64 = session.query_parsed("FREQ:CENT?").unwrap();
    assert_eq!(hz, 1e9);
}

#[rstest]
fn test_status_check_disabled() {
    let script = LoopbackInterface::new("\n")
        .expect_query("*IDN?", IDN)
        .expect_query("*OPT?", "0")
        .expect_write("*CLS")
        .expect_write("*ESE 1")
        .expect_write("FREQ:SPAN 1000");
    let opts = SessionOptions::default().with_query_instrument_status(false);
    let session = Session::init(script, opts).unwrap();
    session.write("FREQ:SPAN 1000").unwrap();
}

#[rstest]
fn test_query_parse_error() {
    let script = init_script().expect_query("FREQ:SPAN?", "wide");
    let session = open(script);
    let err = session.query_parsed::<f64>("FREQ:SPAN?").unwrap_err();
    match err {
        SpecanError::Protocol { command, response } => {
            assert_eq!(command, "FREQ:SPAN?");
            assert_eq!(response, "wide");
        }
        other => panic!("Expected a protocol error, got {other:?}"),
    }
}

/// A failed check retries once with the error queue drained, oldest entry first.
#[rstest]
fn test_status_check_recovers_once() {
    let script = init_script()
        .expect_write("FREQ:CENTX 1")
        .expect_status_polls(2, StatusByte::ERROR_QUEUE)
        .expect_query("SYST:ERR?", "-113,\"Undefined header\"")
        .expect_query("SYST:ERR?", "-222,\"Data out of range\"")
        .expect_query("SYST:ERR?", "0,\"No error\"");
    let session = open(script);
    let err = session.write("FREQ:CENTX 1").unwrap_err();
    assert_eq!(
        err.fault_entries().unwrap(),
        &[
            ErrorQueueEntry::new(-113, "Undefined header"),
            ErrorQueueEntry::new(-222, "Data out of range"),
        ]
    );
    assert_eq!(
        session.acquire().unwrap().recovery_state(),
        RecoveryState::Normal
    );
}

/// With auto system-error query, the queue is drained right away and there is no second poll.
#[rstest]
fn test_status_check_auto_error_query() {
    let script = init_script()
        .expect_write("INIT:CONT OFF")
        .expect_status_polls(1, StatusByte::ERROR_QUEUE)
        .expect_query("SYST:ERR?", "-221,\"Settings conflict\"")
        .expect_query("SYST:ERR?", "0,\"No error\"");
    let opts = SessionOptions::default().with_auto_system_error_query(true);
    let session = Session::init(script, opts).unwrap();
    let err = session.write("INIT:CONT OFF").unwrap_err();
    assert!(matches!(err, SpecanError::InstrumentFault(ref e) if e.len() == 1));
}

/// The drain stops after a bounded number of queries if the queue never reports "no error".
#[rstest]
fn test_drain_error_queue_is_bounded() {
    let mut script = init_script();
    for _ in 0..MAX_ERROR_QUEUE_DRAIN {
        script = script.expect_query("SYST:ERR?", "-350,\"Queue overflow\"");
    }
    let session = open(script);
    let err = session.drain_error_queue().unwrap_err();
    match err {
        SpecanError::Protocol { command, .. } => assert_eq!(command, "SYST:ERR?"),
        other => panic!("Expected a protocol error, got {other:?}"),
    }
}

/// A timeout stays a timeout and operation complete is cancelled even if draining fails.
#[rstest]
fn test_timeout_survives_failed_drain() {
    let script = init_script()
        .expect_write("INIT:IMM;*OPC")
        .expect_status_polls(1, 0)
        .expect_query("SYST:ERR?", "busy")
        .expect_write("*CLS");
    let opts = SessionOptions::default().with_completion_timeout(Duration::ZERO);
    let session = Session::init(script, opts).unwrap();
    let err = session.write_with_opc("INIT:IMM").unwrap_err();
    match err {
        SpecanError::Timeout { timeout, .. } => assert_eq!(timeout, Duration::ZERO),
        other => panic!("Expected a timeout, got {other:?}"),
    }
}

/// A fault stays a fault and operation complete is cancelled even if draining fails.
#[rstest]
fn test_fault_survives_failed_drain() {
    let script = init_script()
        .expect_write("INIT:IMM;*OPC")
        .expect_status_polls(1, StatusByte::ERROR_QUEUE)
        .expect_query("SYST:ERR?", "busy")
        .expect_write("*CLS");
    let session = open(script);
    let err = session.write_with_opc("INIT:IMM").unwrap_err();
    assert!(matches!(err, SpecanError::Faulted { .. }), "{err:?}");
}

#[rstest]
fn test_read_register() {
    let script = init_script()
        .expect_query("STAT:QUES:POW:COND?", "8")
        .expect_query("*ESR?", "300");
    let session = open(script);
    let cond = session
        .read_register(StatusRegister::QuestionablePower, RegisterPart::Condition)
        .unwrap();
    assert_eq!(cond, 8);
    let err = session
        .read_register(StatusRegister::StandardEvent, RegisterPart::Event)
        .unwrap_err();
    assert!(matches!(err, SpecanError::Protocol { .. }));
}

/// Transition filters are written before the enable mask.
#[rstest]
fn test_write_register_masks() {
    let script = init_script()
        .expect_write("STAT:OPER:PTR 0")
        .expect_write("STAT:OPER:NTR 16")
        .expect_write("STAT:OPER:ENAB 16")
        .expect_status_polls(1, 0);
    let session = open(script);
    session
        .write_register_masks(StatusRegister::Operation, RegisterMasks::falling(16))
        .unwrap();
}

#[rstest]
#[case(StatusRegister::StandardEvent, RegisterMasks::rising(1))]
#[case(StatusRegister::StatusByte, RegisterMasks::falling(4))]
#[case(StatusRegister::StatusByte, RegisterMasks { enable: 256, ..Default::default() })]
fn test_write_register_masks_rejected(
    #[case] register: StatusRegister,
    #[case] masks: RegisterMasks,
) {
    let session = open(init_script());
    let err = session.write_register_masks(register, masks).unwrap_err();
    assert!(matches!(err, SpecanError::Parameter(_)));
}

/// Arming a leaf sets its masks and ORs the summary bit into every ancestor below the status
/// byte.
#[rstest]
fn test_arm_questionable_power() {
    let script = init_script()
        .expect_write("STAT:QUES:POW:PTR 4")
        .expect_write("STAT:QUES:POW:NTR 0")
        .expect_write("STAT:QUES:POW:ENAB 4")
        .expect_query("STAT:QUES:ENAB?", "512")
        .expect_query("STAT:QUES:PTR?", "65535")
        .expect_query("STAT:QUES:NTR?", "0")
        .expect_write("STAT:QUES:PTR 65535")
        .expect_write("STAT:QUES:NTR 0")
        .expect_write("STAT:QUES:ENAB 520")
        .expect_status_polls(1, 0);
    let session = open(script);
    session.arm(StatusRegister::QuestionablePower, 4).unwrap();
}

/// The IEEE 488.2 registers are armed through their enable mask alone.
#[rstest]
#[case(StatusRegister::StandardEvent, "*ESE?", "1", "*ESE 17")]
#[case(StatusRegister::StatusByte, "*SRE?", "0", "*SRE 16")]
fn test_arm_ieee_register(
    #[case] register: StatusRegister,
    #[case] query: &str,
    #[case] enabled: &str,
    #[case] write: &str,
) {
    let script = init_script()
        .expect_query(query, enabled)
        .expect_write(write)
        .expect_status_polls(1, 0);
    let session = open(script);
    session.arm(register, 16).unwrap();
}

#[rstest]
fn test_query_with_timeout_restores_transport_timeout() {
    let script = init_script().expect_query("*CAL?", "0");
    let session = open(script);
    let before = session.transport_timeout().unwrap();
    let resp = session
        .acquire()
        .unwrap()
        .query_with_timeout("*CAL?", Duration::from_secs(60))
        .unwrap();
    assert_eq!(resp, "0");
    assert_eq!(session.transport_timeout().unwrap(), before);
}

#[rstest]
fn test_close() {
    let session = open(init_script());
    let other = session.clone();
    session.close().unwrap();
    assert!(matches!(
        other.write("*CLS"),
        Err(SpecanError::Session(SessionError::Closed))
    ));
    assert!(matches!(
        session.close(),
        Err(SpecanError::Session(SessionError::Closed))
    ));
}

/// A simulated session never touches the interface and succeeds trivially.
#[rstest]
fn test_simulated_session() {
    let opts = SessionOptions::default().with_simulate(true);
    let session = Session::init(LoopbackInterface::new("\n"), opts).unwrap();
    assert!(session.is_simulated().unwrap());
    assert_eq!(session.identity().unwrap(), Some(Identity::simulated()));
    session.write("FREQ:CENT 1e9").unwrap();
    assert_eq!(session.query("FREQ:CENT?").unwrap(), "0");
    let done = session.write_with_opc("INIT:IMM").unwrap();
    assert_eq!(done.elapsed, Duration::ZERO);
    assert!(session.drain_error_queue().unwrap().is_empty());
    session.close().unwrap();
}
