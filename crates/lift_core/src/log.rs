//! Event log: newline-delimited JSON records drained from the bus mirror.
//!
//! Each record is `{"type": ..., "time": ..., "data": ...}` with `time` in
//! virtual-clock seconds. Records appear in non-decreasing time order because
//! the mirror preserves publish order. Internal command messages (task
//! assignments, car-call presses) have no record type and are skipped.

use std::io::{self, Write};

use serde::Serialize;

use crate::bus::{BusRecord, Message};
use crate::clock::ms_to_secs;

#[derive(Debug, Serialize)]
struct LogLine<'a> {
    #[serde(rename = "type")]
    record_type: &'static str,
    time: f64,
    data: &'a Message,
}

/// Record type of a mirrored message, or `None` for bus-internal traffic.
pub fn record_type(message: &Message) -> Option<&'static str> {
    match message {
        Message::Metadata { .. } => Some("metadata"),
        Message::CarStatus { .. } => Some("elevator_status"),
        Message::Assignment { .. } => Some("hall_call_assignment"),
        Message::HallCallRegistered { .. } => Some("hall_call_registered"),
        Message::HallCallOff { .. } => Some("hall_call_off"),
        Message::CarCallRegistered { .. } => Some("car_call_registered"),
        Message::CarCallOff { .. } => Some("car_call_off"),
        Message::DoorEvent { .. } => Some("door_event"),
        Message::PassengerWaiting { .. } => Some("passenger_waiting"),
        Message::PassengerBoarding { .. } => Some("passenger_boarding"),
        Message::PassengerAlighting { .. } => Some("passenger_alighting"),
        Message::FullLoadBypass { .. } => Some("full_load_bypass"),
        Message::HallCall { .. }
        | Message::AssignHallCall { .. }
        | Message::ForcedMove { .. }
        | Message::MoveTo { .. }
        | Message::CarCallPress { .. } => None,
    }
}

/// Streams mirrored bus records as NDJSON.
pub struct EventLogWriter<W: Write> {
    out: W,
}

impl<W: Write> EventLogWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Write every loggable record in `records`, one JSON object per line.
    pub fn write_records(&mut self, records: &[BusRecord]) -> io::Result<()> {
        for record in records {
            let Some(record_type) = record_type(&record.message) else {
                continue;
            };
            let line = LogLine {
                record_type,
                time: ms_to_secs(record.time_ms),
                data: &record.message,
            };
            serde_json::to_writer(&mut self.out, &line)?;
            self.out.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::{CallType, Direction};

    #[test]
    fn internal_messages_have_no_record_type() {
        assert_eq!(
            record_type(&Message::AssignHallCall { floor: 2, direction: Direction::Up }),
            None
        );
        assert_eq!(
            record_type(&Message::CarCallPress {
                destination: 9,
                passenger: "Passenger_1".to_string(),
                auto_registered: false,
            }),
            None
        );
    }

    #[test]
    fn streams_records_to_a_file() {
        let file = tempfile::NamedTempFile::new().expect("tempfile");
        let mut writer =
            EventLogWriter::new(std::io::BufWriter::new(file.reopen().expect("reopen")));
        writer
            .write_records(&[BusRecord {
                time_ms: 1500,
                topic: "passenger/waiting".to_string(),
                message: Message::PassengerWaiting {
                    passenger: "Passenger_1".to_string(),
                    floor: 4,
                    direction: Some(Direction::Down),
                    destination: None,
                },
            }])
            .expect("write");
        writer.flush().expect("flush");

        let contents = std::fs::read_to_string(file.path()).expect("read");
        let parsed: serde_json::Value =
            serde_json::from_str(contents.trim_end()).expect("one json line");
        assert_eq!(parsed["type"], "passenger_waiting");
        assert_eq!(parsed["time"], 1.5);
        assert_eq!(parsed["data"]["floor"], 4);
    }

    #[test]
    fn records_serialize_as_type_time_data_lines() {
        let records = vec![
            BusRecord {
                time_ms: 6000,
                topic: "log/hall_call_registered".to_string(),
                message: Message::HallCallRegistered {
                    floor: 2,
                    direction: Some(Direction::Up),
                    destination: None,
                    passenger: "Passenger_1".to_string(),
                    reason: None,
                },
            },
            BusRecord {
                time_ms: 6000,
                topic: "gcs/hall_call".to_string(),
                message: Message::HallCall {
                    floor: 2,
                    direction: Some(Direction::Up),
                    destination: None,
                    passenger: "Passenger_1".to_string(),
                    call_type: CallType::Traditional,
                    reason: None,
                },
            },
        ];

        let mut writer = EventLogWriter::new(Vec::new());
        writer.write_records(&records).expect("write");
        let out = String::from_utf8(writer.into_inner()).expect("utf8");

        // The raw hall-call command is skipped; only the record line remains.
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(lines[0]).expect("json");
        assert_eq!(parsed["type"], "hall_call_registered");
        assert_eq!(parsed["time"], 6.0);
        assert_eq!(parsed["data"]["floor"], 2);
        assert_eq!(parsed["data"]["direction"], "UP");
    }
}
