#![no_main]

use libfuzzer_sys::fuzz_target;
use mpeg2ts_es::demultiplex::{DemuxConfig, Demultiplex, PidSelection};
use mpeg2ts_es::packet::Pid;
use mpeg2ts_es::pes::Timestamp;
use mpeg2ts_es::report::NullLogSink;

fuzz_target!(|data: &[u8]| {
    let sink = |_pid: Pid, _data: &[u8], _pts: Option<Timestamp>| -> std::io::Result<()> { Ok(()) };
    let config = DemuxConfig {
        selection: PidSelection::Auto,
        es_buffer_capacity: 64 * 1024,
        ..DemuxConfig::default()
    };
    let mut demux = Demultiplex::new(config, sink, NullLogSink).unwrap();
    let _ = demux.push(data);
    let _ = demux.finish();
});
