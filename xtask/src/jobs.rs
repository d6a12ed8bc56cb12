//! Per-task job reconstruction.
//!
//! Groups the decoded records of every core by task (or interrupt), then
//! rebuilds jobs and execution intervals from them:
//!
//! - a job is released by the first ready event while no job is open, or by
//!   an exec start if the task never became ready in the capture
//! - exec start/stop pairs become execution intervals tagged with their core
//! - a delay-until marks the open job as finishing at the next exec stop and
//!   sets its deadline from the wake tick
//! - each ISR enter/exit pair is one job of that interrupt
//!
//! All cores share one time base, so a task's records from different cores
//! are merged by timestamp. Job times are relative to the first ready event
//! of the whole capture.

use std::collections::HashMap;
use std::fmt;
use std::io::Write;

use anyhow::{anyhow, Result};
use coretrace::decode::{Decoder, Payload};
use coretrace::EventId;

use crate::trace_parser::CoreTrace;

/// Owned payload of a decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    None,
    Task(u32),
    Irq(u32),
    WakeTime(u32),
    Create {
        task_id: u32,
        priority: u32,
        name: String,
    },
}

impl fmt::Display for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventPayload::None => Ok(()),
            EventPayload::Task(id) => write!(f, "task={:#010x}", id),
            EventPayload::Irq(irq) => write!(f, "irq={}", irq),
            EventPayload::WakeTime(wake) => write!(f, "wake={}", wake),
            EventPayload::Create {
                task_id,
                priority,
                name,
            } => write!(f, "task={:#010x} prio={} name={}", task_id, priority, name),
        }
    }
}

/// One decoded record with the core it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub core: usize,
    /// Absolute timestamp in microseconds.
    pub timestamp: u64,
    pub event: EventId,
    pub payload: EventPayload,
}

/// Decode every core's words into owned events, core by core.
pub fn collect_events(traces: &[CoreTrace], start_us: u64) -> Result<Vec<TraceEvent>> {
    let mut events = Vec::new();

    for trace in traces {
        for result in Decoder::with_start(&trace.words[..], start_us) {
            let record = result.map_err(|err| anyhow!("CPU{}: {}", trace.core, err))?;
            let payload = match record.payload {
                Payload::None => EventPayload::None,
                Payload::Task(id) => EventPayload::Task(id),
                Payload::Irq(irq) => EventPayload::Irq(irq),
                Payload::WakeTime(wake) => EventPayload::WakeTime(wake),
                Payload::TaskCreate(create) => EventPayload::Create {
                    task_id: create.task_id,
                    priority: create.priority,
                    name: String::from_utf8_lossy(&create.name_bytes().collect::<Vec<_>>())
                        .into_owned(),
                },
            };
            events.push(TraceEvent {
                core: trace.core,
                timestamp: record.timestamp,
                event: record.event,
                payload,
            });
        }
    }

    Ok(events)
}

/// One execution interval of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub core: usize,
    pub start: u64,
    pub stop: u64,
}

impl Interval {
    pub fn duration(&self) -> u64 {
        self.stop.saturating_sub(self.start)
    }
}

/// One job of a task or interrupt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub index: usize,
    pub release: u64,
    /// Absolute deadline, known for jobs ended by a delay-until.
    pub deadline: Option<u64>,
    pub intervals: Vec<Interval>,
    active: Option<(usize, u64)>,
}

impl Job {
    fn new(index: usize, release: u64) -> Self {
        Self {
            index,
            release,
            deadline: None,
            intervals: Vec::new(),
            active: None,
        }
    }

    /// Start of the first execution interval.
    pub fn start(&self) -> Option<u64> {
        self.intervals.first().map(|i| i.start)
    }

    /// End of the last execution interval.
    pub fn finish(&self) -> Option<u64> {
        self.intervals.last().map(|i| i.stop)
    }

    /// Release to finish; `None` if the job never ran.
    pub fn response_time(&self) -> Option<u64> {
        self.finish().map(|finish| finish.saturating_sub(self.release))
    }
}

/// What a [`TaskTrace`] stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    /// Scheduler task, keyed by its trace id.
    Task(u32),
    /// Interrupt handler, keyed by its exception number.
    Isr(u32),
}

/// Events and jobs of one task or interrupt.
#[derive(Debug, Clone)]
pub struct TaskTrace {
    pub owner: Owner,
    pub name: String,
    /// `None` for interrupts and tasks created before the capture.
    pub priority: Option<u32>,
    /// This owner's events, sorted by timestamp.
    pub events: Vec<TraceEvent>,
    /// Completed jobs.
    pub jobs: Vec<Job>,
    /// Events that did not fit the job model, such as a stop without a start.
    pub anomalies: usize,
    current: Option<Job>,
}

impl TaskTrace {
    fn new(owner: Owner, name: String, priority: Option<u32>) -> Self {
        Self {
            owner,
            name,
            priority,
            events: Vec::new(),
            jobs: Vec::new(),
            anomalies: 0,
            current: None,
        }
    }

    /// The job still open at the end of the capture.
    pub fn current(&self) -> Option<&Job> {
        self.current.as_ref()
    }

    /// Largest observed response time over the completed jobs.
    pub fn max_response_time(&self) -> Option<u64> {
        self.jobs.iter().filter_map(Job::response_time).max()
    }

    fn release(&mut self, ts: u64) -> &mut Job {
        let index = self.jobs.len();
        self.current.get_or_insert_with(|| Job::new(index, ts))
    }

    fn start_exec(&mut self, ts: u64, core: usize) {
        let job = self.release(ts);
        if job.active.replace((core, ts)).is_some() {
            self.anomalies += 1;
        }
    }

    fn stop_exec(&mut self, ts: u64) {
        let Some(job) = self.current.as_mut() else {
            self.anomalies += 1;
            return;
        };
        match job.active.take() {
            Some((core, start)) => job.intervals.push(Interval {
                core,
                start,
                stop: ts,
            }),
            None => self.anomalies += 1,
        }
    }

    /// Wake ticks count from the scheduler start, taken as the first release.
    fn set_deadline(&mut self, wake_us: u64) {
        let first = self
            .jobs
            .first()
            .or(self.current.as_ref())
            .map(|job| job.release);
        if let (Some(first), Some(job)) = (first, self.current.as_mut()) {
            job.deadline = Some(first + wake_us);
        }
    }

    fn finish_job(&mut self) {
        if let Some(job) = self.current.take() {
            self.jobs.push(job);
        }
    }

    /// Walk the sorted events and rebuild the jobs.
    fn build_jobs(&mut self, trace_start: u64, tick_us: u64) {
        let events = std::mem::take(&mut self.events);
        let mut finishes = false;
        let mut wake_us = 0;

        for evt in &events {
            let ts = evt.timestamp.saturating_sub(trace_start);
            match (evt.event, &evt.payload) {
                (EventId::ReadyStart, _) => {
                    if self.current.is_none() {
                        self.release(ts);
                        finishes = false;
                    }
                }
                (EventId::ExecStart, _) | (EventId::IsrEnter, _) => self.start_exec(ts, evt.core),
                (EventId::DelayUntil, EventPayload::WakeTime(wake)) => {
                    finishes = true;
                    wake_us = *wake as u64 * tick_us;
                }
                (EventId::ExecStop, _) => {
                    self.stop_exec(ts);
                    if finishes {
                        self.set_deadline(wake_us);
                        self.finish_job();
                        finishes = false;
                    }
                }
                (EventId::IsrExit, _) | (EventId::IsrExitToScheduler, _) => {
                    self.stop_exec(ts);
                    self.finish_job();
                }
                _ => {}
            }
        }

        self.events = events;
    }
}

impl fmt::Display for TaskTrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} jobs)", self.name, self.jobs.len())
    }
}

/// Tasks and interrupts rebuilt from one capture.
#[derive(Debug, Default)]
pub struct TaskModel {
    /// Timestamp taken as time zero: the first ready event.
    pub trace_start: u64,
    /// In order of first appearance.
    pub tasks: Vec<TaskTrace>,
    /// Events no owner could be found for.
    pub unassigned: usize,
}

impl TaskModel {
    /// Owners with at least one completed job.
    pub fn active(&self) -> impl Iterator<Item = &TaskTrace> {
        self.tasks.iter().filter(|task| !task.jobs.is_empty())
    }
}

/// Last owners seen on one core, for records that carry no id.
#[derive(Debug, Default, Clone, Copy)]
struct CoreCursor {
    /// Task of the last exec or ready event, and its timestamp.
    task: Option<(u32, u64)>,
    /// Interrupt of the last ISR event, and the exit time if that was an exit.
    irq: Option<(u32, Option<u64>)>,
}

#[derive(Default)]
struct Builder {
    tasks: Vec<TaskTrace>,
    index: HashMap<Owner, usize>,
}

impl Builder {
    fn task(&mut self, owner: Owner) -> &mut TaskTrace {
        let next = self.tasks.len();
        let idx = *self.index.entry(owner).or_insert(next);
        if idx == next {
            let name = match owner {
                Owner::Task(id) => format!("{:#010x}", id),
                Owner::Isr(irq) => format!("IRQ{}", irq),
            };
            self.tasks.push(TaskTrace::new(owner, name, None));
        }
        &mut self.tasks[idx]
    }

    fn push(&mut self, owner: Owner, event: TraceEvent) {
        self.task(owner).events.push(event);
    }
}

/// Rebuild tasks and jobs from events collected core by core.
///
/// `tick_us` converts delay-until wake ticks to microseconds.
pub fn build(events: &[TraceEvent], tick_us: u64) -> TaskModel {
    let mut builder = Builder::default();
    let mut cursors: HashMap<usize, CoreCursor> = HashMap::new();
    let mut unassigned = 0;

    let trace_start = events
        .iter()
        .filter(|evt| evt.event == EventId::ReadyStart)
        .map(|evt| evt.timestamp)
        .min()
        .unwrap_or(0);

    for evt in events {
        let cursor = cursors.entry(evt.core).or_default();

        match (evt.event, &evt.payload) {
            (
                _,
                EventPayload::Create {
                    task_id,
                    priority,
                    name,
                },
            ) => {
                let task = builder.task(Owner::Task(*task_id));
                task.name = name.clone();
                task.priority = Some(*priority);
            }
            (_, EventPayload::Task(id)) => {
                cursor.task = Some((*id, evt.timestamp));
                builder.push(Owner::Task(*id), evt.clone());
            }
            (EventId::DelayUntil, _) => match cursor.task {
                Some((id, _)) => builder.push(Owner::Task(id), evt.clone()),
                None => unassigned += 1,
            },
            (EventId::IsrEnter, EventPayload::Irq(irq)) => {
                cursor.irq = Some((*irq, None));
                builder.push(Owner::Isr(*irq), evt.clone());
            }
            (EventId::IsrExit, _) | (EventId::IsrExitToScheduler, _) => match cursor.irq {
                Some((irq, last_exit)) => {
                    if let Some(last_exit) = last_exit {
                        // exit after exit: the enter was never recorded
                        let task_ts = cursor.task.map_or(last_exit, |(_, ts)| ts);
                        builder.push(
                            Owner::Isr(irq),
                            TraceEvent {
                                core: evt.core,
                                timestamp: task_ts.max(last_exit),
                                event: EventId::IsrEnter,
                                payload: EventPayload::Irq(irq),
                            },
                        );
                    }
                    cursor.irq = Some((irq, Some(evt.timestamp)));
                    builder.push(Owner::Isr(irq), evt.clone());
                }
                None => unassigned += 1,
            },
            _ => {}
        }
    }

    let mut tasks = builder.tasks;
    for task in &mut tasks {
        task.events.sort_by_key(|evt| evt.timestamp);
        task.build_jobs(trace_start, tick_us);
    }

    TaskModel {
        trace_start,
        tasks,
        unassigned,
    }
}

fn millis(us: u64) -> f64 {
    us as f64 / 1000.0
}

fn millis_or_dash(us: Option<u64>) -> String {
    us.map_or_else(|| "-".to_string(), |us| format!("{:.3}", millis(us)))
}

/// Write every active owner's events, grouped by owner.
pub fn write_task_events<W: Write>(model: &TaskModel, out: &mut W) -> Result<()> {
    for task in model.active() {
        writeln!(out, "Task: {}", task.name)?;
        for evt in &task.events {
            writeln!(
                out,
                "\tts: {:06.3}ms\tCPU{}\t{}: {}",
                millis(evt.timestamp),
                evt.core,
                evt.event.name(),
                evt.payload
            )?;
        }
    }
    Ok(())
}

/// Print the task table, and every job if `jobs` is set.
pub fn print_tasks(model: &TaskModel, jobs: bool) {
    println!();
    println!("Tasks");
    println!("=====");
    println!("Time zero: {:.3} ms (first ready event)", millis(model.trace_start));
    println!(
        "{:<20}  {:>12}  {:>4}  {:>5}  {:>12}",
        "Name", "ID", "Prio", "Jobs", "Max RT (ms)"
    );
    println!("{}", "-".repeat(61));

    for task in model.active() {
        let id = match task.owner {
            Owner::Task(id) => format!("{:#x}", id),
            Owner::Isr(irq) => format!("irq {}", irq),
        };
        let prio = task.priority.map_or_else(|| "-".to_string(), |p| p.to_string());
        println!(
            "{:<20}  {:>12}  {:>4}  {:>5}  {:>12}",
            task.name,
            id,
            prio,
            task.jobs.len(),
            millis_or_dash(task.max_response_time())
        );

        if jobs {
            for job in &task.jobs {
                let relative = job.deadline.map(|d| d.saturating_sub(job.release));
                println!(
                    "    Job-{} release {:.3} start {} deadline {} relative {}",
                    job.index,
                    millis(job.release),
                    millis_or_dash(job.start()),
                    millis_or_dash(job.deadline),
                    millis_or_dash(relative)
                );
                for interval in &job.intervals {
                    println!(
                        "        CPU{} [{:.3}, {:.3}] len={:.3}",
                        interval.core,
                        millis(interval.start),
                        millis(interval.stop),
                        millis(interval.duration())
                    );
                }
            }
            if task.current().is_some() {
                println!("    Job-{} still open", task.jobs.len());
            }
        }
    }

    let anomalies: usize = model.tasks.iter().map(|task| task.anomalies).sum();
    if anomalies + model.unassigned > 0 {
        println!();
        println!(
            "{} unmatched start/stop events, {} events without an owner",
            anomalies, model.unassigned
        );
    }
}
