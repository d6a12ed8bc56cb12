//! Raw trace buffer parser.
//!
//! Reads the little-endian buffer images dumped from the target (one file per
//! core), decodes them with `coretrace::decode` and renders a timeline or a
//! summary.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use coretrace::decode::{words_from_le_bytes, Decoder, Payload};
use coretrace::{EventId, EVENT_COUNT};

/// One core's captured words.
pub struct CoreTrace {
    pub core: usize,
    pub words: Vec<u32>,
}

/// A task announced by a task-create record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub id: u32,
    pub priority: u32,
    pub name: String,
    pub core: usize,
}

/// Per-run statistics.
#[derive(Debug, Default)]
pub struct Summary {
    /// Record counts indexed by `EventId::id() - 1`, per core.
    pub counts: Vec<[u64; EVENT_COUNT]>,
    /// Tasks by id.
    pub tasks: BTreeMap<u32, TaskInfo>,
    /// Timestamp of the first ready event over all cores.
    pub first_ready_us: Option<u64>,
    /// Words decoded per core.
    pub words_used: Vec<usize>,
}

/// Load one raw buffer image.
pub fn load_file<P: AsRef<Path>>(core: usize, path: P) -> Result<CoreTrace> {
    let path = path.as_ref();
    let data = std::fs::read(path)
        .with_context(|| format!("Failed to read trace buffer: {}", path.display()))?;
    if data.len() % 4 != 0 {
        eprintln!(
            "warning: {} has {} trailing bytes, ignored",
            path.display(),
            data.len() % 4
        );
    }
    Ok(parse_blob(core, &data))
}

/// Words of a raw little-endian buffer image.
pub fn parse_blob(core: usize, data: &[u8]) -> CoreTrace {
    CoreTrace {
        core,
        words: words_from_le_bytes(data).collect(),
    }
}

fn millis(ts_us: u64) -> f64 {
    ts_us as f64 / 1000.0
}

/// Write one line per record: `ts: <ms>ms\t<NAME>: <payload>`.
///
/// Returns the number of records written. A decode error ends the core's
/// timeline and is returned after the records before it were written.
pub fn write_timeline<W: Write>(trace: &CoreTrace, start_us: u64, out: &mut W) -> Result<usize> {
    writeln!(out, "CPU{}:", trace.core)?;

    let mut records = 0;
    for result in Decoder::with_start(&trace.words[..], start_us) {
        let record = result.map_err(|err| anyhow!("CPU{}: {}", trace.core, err))?;
        writeln!(
            out,
            "\tts: {:06.3}ms\t{}: {}",
            millis(record.timestamp),
            record.event.name(),
            record.payload
        )?;
        records += 1;
    }
    Ok(records)
}

/// Count events and collect the task table over all cores.
pub fn summarize(traces: &[CoreTrace], start_us: u64) -> Result<Summary> {
    let mut summary = Summary::default();

    for trace in traces {
        let mut counts = [0u64; EVENT_COUNT];
        let mut decoder = Decoder::with_start(&trace.words[..], start_us);

        for result in decoder.by_ref() {
            let record = result.map_err(|err| anyhow!("CPU{}: {}", trace.core, err))?;
            counts[record.event.id() as usize - 1] += 1;

            match record.payload {
                Payload::TaskCreate(create) => {
                    let name = String::from_utf8_lossy(&create.name_bytes().collect::<Vec<_>>())
                        .into_owned();
                    summary.tasks.insert(
                        create.task_id,
                        TaskInfo {
                            id: create.task_id,
                            priority: create.priority,
                            name,
                            core: trace.core,
                        },
                    );
                }
                Payload::Task(_) if record.event == EventId::ReadyStart => {
                    let first = summary.first_ready_us.get_or_insert(record.timestamp);
                    *first = (*first).min(record.timestamp);
                }
                _ => {}
            }
        }

        summary.counts.push(counts);
        summary.words_used.push(decoder.position());
    }

    Ok(summary)
}

/// Print a summary table.
pub fn print_summary(summary: &Summary) {
    println!();
    println!("Trace Summary");
    println!("=============");

    print!("{:<30}", "Event");
    for core in 0..summary.counts.len() {
        print!("  {:>8}", format!("CPU{}", core));
    }
    println!();
    println!("{}", "-".repeat(30 + 10 * summary.counts.len()));

    for event in EventId::ALL {
        let idx = event.id() as usize - 1;
        if summary.counts.iter().all(|c| c[idx] == 0) {
            continue;
        }
        print!("{:<30}", event.name());
        for counts in &summary.counts {
            print!("  {:>8}", counts[idx]);
        }
        println!();
    }

    print!("{:<30}", "words used");
    for used in &summary.words_used {
        print!("  {:>8}", used);
    }
    println!();

    println!();
    println!("{:>12}  {:>4}  {:>4}  Name", "Task", "Prio", "CPU");
    println!("{}", "-".repeat(40));
    for task in summary.tasks.values() {
        println!(
            "{:>#12x}  {:>4}  {:>4}  {}",
            task.id, task.priority, task.core, task.name
        );
    }

    if let Some(first) = summary.first_ready_us {
        println!();
        println!("First task ready at {:.3} ms", millis(first));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(event: EventId, delta: u16) -> u32 {
        ((event.id() as u32) << 16) | delta as u32
    }

    fn blob(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    fn sample() -> Vec<u32> {
        vec![
            header(EventId::TraceStart, 500),
            header(EventId::TaskCreate, 20),
            0x2000_1000,
            2,
            3,
            u32::from_le_bytes(*b"blin"),
            u32::from_le_bytes([b'k', 0, 0, 0]),
            header(EventId::ReadyStart, 1000),
            0x2000_1000,
            header(EventId::ExecStart, 5),
            0x2000_1000,
        ]
    }

    #[test]
    fn test_parse_blob_ignores_trailing_bytes() {
        let mut data = blob(&[1, 2]);
        data.push(0xFF);
        let trace = parse_blob(1, &data);
        assert_eq!(trace.core, 1);
        assert_eq!(trace.words, [1, 2]);
    }

    #[test]
    fn test_timeline_format() {
        let trace = parse_blob(0, &blob(&sample()));
        let mut out = Vec::new();
        let records = write_timeline(&trace, 0, &mut out).unwrap();
        assert_eq!(records, 4);

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "CPU0:");
        assert_eq!(lines[1], "\tts: 00.500ms\tTRACE_START: ");
        assert_eq!(
            lines[2],
            "\tts: 00.520ms\tTRACE_TASK_CREATE: task=0x20001000 prio=3 name=blink"
        );
        assert_eq!(lines[3], "\tts: 01.520ms\tTRACE_TASK_START_READY: task=0x20001000");
        assert_eq!(lines[4], "\tts: 01.525ms\tTRACE_TASK_START_EXEC: task=0x20001000");
    }

    #[test]
    fn test_timeline_reports_decode_error() {
        let trace = CoreTrace {
            core: 1,
            words: vec![header(EventId::Idle, 1), 0x00FF_0000],
        };
        let mut out = Vec::new();
        let err = write_timeline(&trace, 0, &mut out).unwrap_err();
        assert_eq!(err.to_string(), "CPU1: unknown event id 255 at word 1");
        assert!(String::from_utf8(out).unwrap().contains("TRACE_IDLE"));
    }

    #[test]
    fn test_summary_counts_and_tasks() {
        let traces = [
            parse_blob(0, &blob(&sample())),
            CoreTrace {
                core: 1,
                words: vec![
                    header(EventId::Idle, 10),
                    header(EventId::ReadyStart, 100),
                    0x2000_2000,
                    0,
                    0,
                ],
            },
        ];

        let summary = summarize(&traces, 0).unwrap();
        let idle = EventId::Idle.id() as usize - 1;
        let ready = EventId::ReadyStart.id() as usize - 1;
        assert_eq!(summary.counts[0][ready], 1);
        assert_eq!(summary.counts[1][idle], 1);
        assert_eq!(summary.words_used, [11, 3]);
        assert_eq!(summary.first_ready_us, Some(110));

        let task = &summary.tasks[&0x2000_1000];
        assert_eq!(task.name, "blink");
        assert_eq!(task.priority, 3);
        assert_eq!(task.core, 0);
    }
}
