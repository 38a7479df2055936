//! Copy-and-verify matrix
//!
//! Each enabled stage runs the same two hops over the same three buffers:
//!
//! ```text
//!   src ──hop 1──► fix ──hop 2──► dst
//! (coherent)   (write-combined) (coherent)
//! ```
//!
//! The DMA stage copies through the channel, the CPU stage with a plain
//! memory copy. Running both over the same physical memory tells a faulty
//! controller or DMA engine apart from faulty memory cells.
//!
//! After each hop the checksums of both ends are compared and the result is
//! recorded as OK or NG. A transfer error skips the rest of its stage only.

use core::fmt;

use heapless::Vec;
use platform::{DmaEngine, PhysAddr, RandomSource};

use crate::acquire::{ChannelGuard, RunBuffers};
use crate::buffer::{fill_random, Buffer, BufferRole};
use crate::config::TestConfig;
use crate::error::TransferError;
use crate::event::{Event, EventSink};

/// Two hops per stage, two stages
const MAX_RECORDS: usize = 4;

/// At most one abort per stage
const MAX_ABORTS: usize = 2;

/// Copy path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Stage {
    /// DMA engine copy
    Dma,
    /// CPU memory copy
    Cpu,
}

impl Stage {
    /// Label used in log lines
    pub const fn label(self) -> &'static str {
        match self {
            Self::Dma => "DMA",
            Self::Cpu => "CPU",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Copy direction within a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Hop {
    /// `src` into the fixed region
    SrcToFix,
    /// Fixed region into `dst`
    FixToDst,
}

impl Hop {
    /// Source buffer of the hop
    pub const fn from_role(self) -> BufferRole {
        match self {
            Self::SrcToFix => BufferRole::Src,
            Self::FixToDst => BufferRole::Fix,
        }
    }

    /// Destination buffer of the hop
    pub const fn to_role(self) -> BufferRole {
        match self {
            Self::SrcToFix => BufferRole::Fix,
            Self::FixToDst => BufferRole::Dst,
        }
    }
}

/// Outcome of a checksum comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verdict {
    /// Checksums match
    Ok,
    /// Checksums differ
    Ng,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "OK",
            Self::Ng => "NG",
        })
    }
}

/// One completed copy step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StepRecord {
    /// Copy path
    pub stage: Stage,
    /// Direction
    pub hop: Hop,
    /// Bus address copied from
    pub src: PhysAddr,
    /// Bus address copied to
    pub dst: PhysAddr,
    /// Checksum comparison
    pub verdict: Verdict,
}

impl StepRecord {
    fn compare(stage: Stage, hop: Hop, from: &Buffer, to: &Buffer) -> Self {
        let verdict = if from.checksum() == to.checksum() {
            Verdict::Ok
        } else {
            Verdict::Ng
        };
        Self {
            stage,
            hop,
            src: from.phys(),
            dst: to.phys(),
            verdict,
        }
    }
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}:{} -> {}:{} {}",
            self.stage,
            self.hop.from_role(),
            self.src,
            self.hop.to_role(),
            self.dst,
            self.verdict
        )
    }
}

/// A stage cut short by a transfer error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StageAbort {
    /// Stage that was abandoned
    pub stage: Stage,
    /// Hop whose copy failed
    pub hop: Hop,
    /// Engine failure
    pub error: TransferError,
}

impl fmt::Display for StageAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: failed to transfer {}->{}: {}",
            self.stage,
            self.hop.from_role(),
            self.hop.to_role(),
            self.error
        )
    }
}

/// Results of one run
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Report {
    records: Vec<StepRecord, MAX_RECORDS>,
    aborts: Vec<StageAbort, MAX_ABORTS>,
}

impl Report {
    /// Empty report
    pub const fn new() -> Self {
        Self {
            records: Vec::new(),
            aborts: Vec::new(),
        }
    }

    /// Completed steps, in execution order
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Stages cut short
    pub fn aborts(&self) -> &[StageAbort] {
        &self.aborts
    }

    /// Every completed step matched and no stage was cut short
    pub fn all_ok(&self) -> bool {
        self.aborts.is_empty() && self.records.iter().all(|r| r.verdict == Verdict::Ok)
    }

    /// Completed steps of one stage
    pub fn records_for(&self, stage: Stage) -> impl Iterator<Item = &StepRecord> + '_ {
        self.records.iter().filter(move |r| r.stage == stage)
    }

    fn record<S: EventSink + ?Sized>(&mut self, record: StepRecord, sink: &mut S) {
        sink.emit(&Event::Step(record));
        // Capacity covers two hops in each of two stages.
        let _ = self.records.push(record);
    }

    fn abort<S: EventSink + ?Sized>(&mut self, abort: StageAbort, sink: &mut S) {
        sink.emit(&Event::TransferFailed(abort));
        let _ = self.aborts.push(abort);
    }
}

/// Run the enabled stages over the acquired buffers.
///
/// Never fails: mismatches are recorded as NG and transfer errors abort
/// only the stage they occur in.
pub fn run<E, R, S>(
    channel: &mut ChannelGuard<'_, E>,
    buffers: RunBuffers<'_>,
    config: &TestConfig,
    rng: &mut R,
    sink: &mut S,
) -> Report
where
    E: DmaEngine,
    R: RandomSource + ?Sized,
    S: EventSink + ?Sized,
{
    let RunBuffers { src, fix, dst } = buffers;
    let mut report = Report::new();

    fill_random(src, fix, dst, rng);
    if config.dma_enabled() {
        dma_stage(channel, src, fix, dst, &mut report, sink);
    }
    if config.cpu_enabled() {
        fill_random(src, fix, dst, rng);
        cpu_stage(src, fix, dst, &mut report, sink);
    }
    report
}

fn dma_stage<E: DmaEngine, S: EventSink + ?Sized>(
    channel: &mut ChannelGuard<'_, E>,
    src: &Buffer,
    fix: &Buffer,
    dst: &Buffer,
    report: &mut Report,
    sink: &mut S,
) {
    for (hop, from, to) in [(Hop::SrcToFix, src, fix), (Hop::FixToDst, fix, dst)] {
        if let Err(error) = channel.copy(to.phys(), from.phys(), from.len()) {
            let abort = StageAbort {
                stage: Stage::Dma,
                hop,
                error,
            };
            report.abort(abort, sink);
            return;
        }
        report.record(StepRecord::compare(Stage::Dma, hop, from, to), sink);
    }
}

fn cpu_stage<S: EventSink + ?Sized>(
    src: &Buffer,
    fix: &mut Buffer,
    dst: &mut Buffer,
    report: &mut Report,
    sink: &mut S,
) {
    fix.as_bytes_mut().copy_from_slice(src.as_bytes());
    let step = StepRecord::compare(Stage::Cpu, Hop::SrcToFix, src, fix);
    report.record(step, sink);

    dst.as_bytes_mut().copy_from_slice(fix.as_bytes());
    let step = StepRecord::compare(Stage::Cpu, Hop::FixToDst, fix, dst);
    report.record(step, sink);
}
