use std::time::Duration;

use measurements::Frequency;
use specan::{Session, SessionOptions, SimulatedAnalyzer, SpectrumAnalyzer};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // An in-process analyzer whose sweeps take 1.5 s.
    let sim = SimulatedAnalyzer::new().with_operation_time(Some(Duration::from_millis(1_500)));
    let session = Session::init(sim.clone(), SessionOptions::default()).unwrap();
    let analyzer = SpectrumAnalyzer::new(session);
    println!("Instrument ID: {}", analyzer.identity().unwrap());

    analyzer
        .set_center_frequency(Frequency::from_hertz(2.45e9))
        .unwrap();
    analyzer.set_span(Frequency::from_hertz(100e6)).unwrap();

    let done = analyzer.single_sweep(Duration::from_secs(5)).unwrap();
    println!("Sweep took {:?} and {} status polls", done.elapsed, done.polls);

    let trace = analyzer.trace_data(1).unwrap();
    println!("Trace 1: {trace:?}");
}
