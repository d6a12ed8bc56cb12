//! Trace dump through the `log` facade.
//!
//! Decodes a stopped core's buffer in place and emits one line per record,
//! for targets where the only readout channel is the console.
//!
//! # Output Format
//!
//! ```text
//! [TRACE] === CPU0 buffer: 12/1000 words, enabled ===
//! [TRACE] CPU0 idx=0 ts=7 type=7 TRACE_START
//! [TRACE] CPU0 idx=1 ts=19 type=6 TRACE_TASK_CREATE task=0x20001000 prio=3 name=blink
//! [TRACE] CPU0 idx=7 ts=25 type=2 TRACE_TASK_START_EXEC task=0x20001000
//! [TRACE] CPU0 records=3 words=9
//! ```
//!
//! Only call these once capture has stopped on the dumped core.

use crate::context::CoreContext;
use crate::decode::Decoder;
use crate::event::EventId;
use crate::platform::Platform;
use crate::recorder::Tracer;

/// Name of the event with raw id `id`, or `"UNKNOWN"`.
pub fn event_type_name(id: u16) -> &'static str {
    match EventId::from_id(id) {
        Some(event) => event.name(),
        None => "UNKNOWN",
    }
}

/// Dump one core's records; returns the number of records decoded.
pub fn dump_core<const C: usize>(core: usize, ctx: &CoreContext<C>) -> usize {
    let state = ctx.state();
    log::info!(
        "[TRACE] === CPU{} buffer: {}/{} words, {} ===",
        core,
        state.write_index(),
        C,
        if state.is_enabled() { "enabled" } else { "disabled" }
    );

    let mut decoder = Decoder::new(ctx);
    let mut records = 0;
    for result in decoder.by_ref() {
        match result {
            Ok(record) => {
                log::info!(
                    "[TRACE] CPU{} idx={} ts={} type={} {} {}",
                    core,
                    record.offset,
                    record.timestamp,
                    record.event.id(),
                    record.event.name(),
                    record.payload
                );
                records += 1;
            }
            Err(err) => log::warn!("[TRACE] CPU{} {}", core, err),
        }
    }

    log::info!(
        "[TRACE] CPU{} records={} words={}",
        core,
        records,
        decoder.position()
    );
    records
}

/// Dump every core served by `tracer`.
pub fn dump_all<P: Platform, const CORES: usize, const C: usize>(
    tracer: &Tracer<'_, P, CORES, C>,
) -> usize {
    log::info!("[TRACE] ====== TRACE BUFFER DUMP ======");
    let mut total = 0;
    for (core, ctx) in tracer.contexts().iter().enumerate() {
        total += dump_core(core, *ctx);
    }
    log::info!("[TRACE] ====== END TRACE DUMP ({} records) ======", total);
    total
}
