use std::time::Duration;

use specan::{Session, SessionOptions, SpectrumAnalyzer};
use specan_io::TcpIpInterface;

fn main() {
    env_logger::init();

    let addr = "192.168.10.1:5025";

    // Get our TCP/IP instrument interface
    let interface = TcpIpInterface::simple(addr).expect("Failed to connect");

    // Reset at init and allow long sweeps.
    let opts = SessionOptions::default()
        .with_reset(true)
        .with_completion_timeout(Duration::from_secs(30));
    let analyzer = SpectrumAnalyzer::new(Session::init(interface, opts).unwrap());
    println!("Instrument ID: {}", analyzer.identity().unwrap());
    println!("Options: {:?}", analyzer.installed_options().unwrap());

    analyzer.single_sweep(Duration::from_secs(20)).unwrap();
    let trace = analyzer.trace_data(1).unwrap();
    println!("Trace 1 has {} points", trace.len());

    analyzer.close().unwrap();
}
