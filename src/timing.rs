use std::time::Duration;

use tracing::{info, trace, warn};

use crate::error::{Error, Result};
use crate::input::Packet;
use crate::output::SequentialByteSink;
use crate::usb::encoder::Encoder;
use crate::usb::signal::Speed;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Number of bus cycles in `delta`, rounded half to even.
pub fn cycles_in(delta: Duration, clock_rate: u64) -> u64 {
    let num = delta.as_nanos() * u128::from(clock_rate);
    let (q, r) = (num / NANOS_PER_SEC, num % NANOS_PER_SEC);
    let q = if 2 * r > NANOS_PER_SEC || (2 * r == NANOS_PER_SEC && q % 2 == 1) {
        q + 1
    } else {
        q
    };
    q as u64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub packets: usize,
    pub cycles: u64,
}

/// Lays packets on the bus so that they start as many cycles apart as they were captured.
#[derive(Debug, Clone, Copy)]
pub struct Reconciler {
    pub speed: Speed,
    /// Idle cycles before the first packet.
    pub start_padding: u32,
    /// Idle cycles after the last packet.
    pub end_padding: u32,
}

impl Reconciler {
    pub fn run<'p, S, I>(&self, encoder: &mut Encoder<S>, packets: I) -> Result<Summary>
    where
        S: SequentialByteSink,
        I: IntoIterator<Item = &'p Packet>,
    {
        let clock_rate = self.speed.clock_rate();

        encoder.emit_stall(self.start_padding.into())?;
        let mut begins_at = encoder.cycles();
        let mut ends_at = begins_at;
        let mut last_ts = None;
        let mut count = 0;

        for (index, packet) in packets.into_iter().enumerate() {
            let previous = last_ts.unwrap_or(packet.timestamp);
            let delta = packet.timestamp.checked_sub(previous).unwrap_or_else(|| {
                warn!(index, "timestamp goes backward, packet sent right away");
                Duration::from_secs(0)
            });

            let expected = cycles_in(delta, clock_rate);
            let consumed = ends_at - begins_at;
            if consumed > expected {
                return Err(Error::TimingOverrun {
                    packet: index - 1,
                    expected,
                    consumed,
                });
            }
            let stall = expected - consumed;
            trace!(index, expected, consumed, stall, state = ?encoder.state());

            encoder.emit_stall(stall as i64)?;
            begins_at = encoder.cycles();
            encoder.emit_sync()?;
            encoder.emit_bytes(&packet.payload)?;
            encoder.emit_eop()?;
            ends_at = encoder.cycles();

            last_ts = Some(packet.timestamp);
            count += 1;
        }

        encoder.emit_stall(self.end_padding.into())?;
        Ok(Summary {
            packets: count,
            cycles: encoder.cycles(),
        })
    }

    /// Runs the capture through `encoder` then seals the session, even if the run failed.
    pub fn reconstruct<'p, S, I>(&self, mut encoder: Encoder<S>, packets: I) -> Result<Summary>
    where
        S: SequentialByteSink,
        I: IntoIterator<Item = &'p Packet>,
    {
        let outcome = self.run(&mut encoder, packets);
        let sealed = encoder.finish();
        let summary = outcome?;
        sealed?;
        info!(packets = summary.packets, cycles = summary.cycles, "capture rebuilt");
        Ok(summary)
    }
}

#[cfg(test)]
mod test {
    use std::fs::File;

    use super::*;
    use crate::output::memory::MemorySink;
    use crate::output::SessionWriter;
    use crate::usb::signal::{Signal, CHANNELS};

    fn encoder(speed: Speed, interpolate: usize, slice_limit: usize) -> Encoder<MemorySink> {
        let rate = speed.clock_rate() * interpolate as u64;
        let writer = SessionWriter::new(MemorySink::default(), &CHANNELS, rate, slice_limit).unwrap();
        Encoder::new(writer, speed, interpolate)
    }

    fn packet(nanos: u64, payload: &[u8]) -> Packet {
        Packet {
            timestamp: Duration::new(1_600_000_000, 0) + Duration::from_nanos(nanos),
            payload: payload.to_vec(),
        }
    }

    fn full_speed(start_padding: u32, end_padding: u32) -> Reconciler {
        Reconciler {
            speed: Speed::Full,
            start_padding,
            end_padding,
        }
    }

    #[test]
    fn rounds_to_nearest_cycle() {
        assert_eq!(cycles_in(Duration::from_micros(1), 12_000_000), 12);
        assert_eq!(cycles_in(Duration::from_millis(1), 1_500_000), 1_500);
        assert_eq!(cycles_in(Duration::from_nanos(120), 12_000_000), 1);
        assert_eq!(cycles_in(Duration::from_nanos(125), 12_000_000), 2);
        assert_eq!(cycles_in(Duration::from_nanos(375), 12_000_000), 4);
        assert_eq!(cycles_in(Duration::from_nanos(0), 12_000_000), 0);
        assert_eq!(cycles_in(Duration::from_secs(3600), 12_000_000), 43_200_000_000);
    }

    #[test]
    fn packets_start_at_their_capture_offset() {
        let packets = [packet(0, &[0x00]), packet(10_000, &[0x00])];
        let mut enc = encoder(Speed::Full, 1, 1 << 20);
        let summary = full_speed(4, 2).run(&mut enc, &packets).unwrap();

        // sync (8) + 8 bits + eop (3) per packet, second one 120 cycles after the first
        assert_eq!(summary, Summary { packets: 2, cycles: 4 + 120 + 19 + 2 });
        let smp = enc.finish().unwrap().slices("logic-1").concat();
        let j = Speed::Full.sample(Signal::J);
        assert_eq!(smp[..4], [j; 4]);
        assert_eq!(smp[4..12], [1, 2, 1, 2, 1, 2, 1, 1]);
        assert!(smp[23..124].iter().all(|&s| s == j));
        assert_eq!(smp[124..132], [1, 2, 1, 2, 1, 2, 1, 1]);
        assert_eq!(smp[smp.len() - 2..], [j; 2]);
    }

    #[test]
    fn interpolation_does_not_change_timing() {
        let packets = [packet(0, &[0xFF, 0xFF]), packet(20_000, &[0x5A])];
        let mut coarse = encoder(Speed::Full, 1, 1 << 20);
        let mut fine = encoder(Speed::Full, 5, 1 << 20);
        let a = full_speed(4, 0).run(&mut coarse, &packets).unwrap();
        let b = full_speed(4, 0).run(&mut fine, &packets).unwrap();
        assert_eq!(a, b);

        let coarse = coarse.finish().unwrap().slices("logic-1").concat();
        let fine = fine.finish().unwrap().slices("logic-1").concat();
        assert_eq!(fine.len(), coarse.len() * 5);
        assert!(fine.chunks(5).zip(&coarse).all(|(c, &s)| c.iter().all(|&f| f == s)));
    }

    #[test]
    fn slices_hold_every_sample() {
        let packets: Vec<_> = (0..50).map(|i| packet(i * 50_000, &[0xA5, 0x12, 0x34])).collect();
        let mut enc = encoder(Speed::Low, 4, 1000);
        let summary = Reconciler {
            speed: Speed::Low,
            start_padding: 4,
            end_padding: 10,
        }
        .run(&mut enc, &packets)
        .unwrap();

        let sink = enc.finish().unwrap();
        let slices = sink.slices("logic-1");
        assert!(slices.len() > 1);
        assert!(slices.iter().all(|s| s.len() <= 1000));
        let total: usize = slices.iter().map(Vec::len).sum();
        assert_eq!(total as u64, summary.cycles * 4);
    }

    #[test]
    fn no_packets_only_pads() {
        let mut enc = encoder(Speed::Low, 2, 1 << 20);
        let summary = Reconciler {
            speed: Speed::Low,
            start_padding: 4,
            end_padding: 3,
        }
        .run(&mut enc, &Vec::<Packet>::new())
        .unwrap();
        assert_eq!(summary, Summary { packets: 0, cycles: 7 });
    }

    #[test]
    fn packet_too_long_for_its_gap() {
        // 8 bytes need more than 64 cycles but only 12 are available
        let packets = [packet(0, &[0; 8]), packet(1_000, &[0xD2]), packet(900_000, &[0xD2])];
        let mut enc = encoder(Speed::Full, 1, 1 << 20);
        match full_speed(4, 0).run(&mut enc, &packets) {
            Err(Error::TimingOverrun {
                packet,
                expected,
                consumed,
            }) => {
                assert_eq!(packet, 0);
                assert_eq!(expected, 12);
                assert_eq!(consumed, 8 + 64 + 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn overrun_still_seals_the_session() {
        let path = std::env::temp_dir().join(format!(
            "usb-trace-synth-overrun-{}.sr",
            std::process::id()
        ));
        let writer = SessionWriter::open(&path, &CHANNELS, 1_500_000, true, 1 << 20).unwrap();
        let enc = Encoder::new(writer, Speed::Low, 1);
        let packets = [packet(0, &[0x2D, 0x00, 0x10]), packet(1_000, &[0xD2])];
        let reconciler = Reconciler {
            speed: Speed::Low,
            start_padding: 4,
            end_padding: 0,
        };

        assert!(matches!(
            reconciler.reconstruct(enc, &packets),
            Err(Error::TimingOverrun { packet: 0, .. })
        ));

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert!(archive.by_name("version").is_ok());
        assert!(archive.by_name("metadata").is_ok());
        let first = archive.by_name("logic-1-1").unwrap();
        // padding and the first packet made it to the file
        assert_eq!(first.size(), 4 + 8 + 24 + 3);
        drop(first);
        drop(archive);
        std::fs::remove_file(&path).unwrap();
    }
}
