//! Shared test rig: a core wired to simulated pins and a manual counter.

use std::sync::Arc;

use els_common::feed::{FeedSpec, FeedTable};
use els_common::io::DriveLinesConfig;
use els_core::feed::FeedRatio;
use els_core::hal::DriveLines;
use els_core::hal::sim::{ManualCounter, SimInput, SimOutput};
use els_core::{ControlHandle, Core, PositionEncoder, SharedControls, StepPulseGenerator, TickReport};

pub struct Rig<R> {
    pub core: Core<ManualCounter, SimOutput, SimInput, R>,
    pub handle: ControlHandle<ManualCounter>,
    pub encoder: Arc<PositionEncoder<ManualCounter>>,
    pub step: SimOutput,
    pub dir: SimOutput,
    pub enable: SimOutput,
}

impl<R: FeedRatio> Rig<R> {
    /// Rig with feeds `"1:1"`, `"1:2"`, `"3:7"` and the null feed `"off"`.
    pub fn new(max_buffered_steps: u32) -> Self {
        Self::with_table(
            max_buffered_steps,
            FeedTable::new([
                ("1:1", FeedSpec::new(1, 1).unwrap()),
                ("1:2", FeedSpec::new(1, 2).unwrap()),
                ("3:7", FeedSpec::new(3, 7).unwrap()),
                ("off", FeedSpec::NULL),
            ])
            .unwrap(),
        )
    }

    pub fn with_table(max_buffered_steps: u32, table: FeedTable) -> Self {
        let (step, dir, enable) = (SimOutput::new(), SimOutput::new(), SimOutput::new());
        let lines = DriveLines::new(
            step.clone(),
            dir.clone(),
            enable.clone(),
            SimInput::new(true),
            &DriveLinesConfig::default(),
        );
        let encoder = Arc::new(PositionEncoder::new(ManualCounter::new(0)));
        let (core, handle) = Core::<_, _, _, R>::with_representation(
            Arc::clone(&encoder),
            StepPulseGenerator::new(lines, max_buffered_steps),
            table,
            Arc::new(SharedControls::new()),
        );
        Self {
            core,
            handle,
            encoder,
            step,
            dir,
            enable,
        }
    }

    /// Power on, engage `feed` and take the selection tick.
    pub fn engage(&mut self, feed: &str) -> TickReport {
        self.handle.set_power_on(true);
        self.handle.set_feed_by_name(feed).unwrap();
        self.core.tick()
    }

    pub fn spin(&self, ticks: u64) {
        self.encoder.counter().advance(ticks);
    }

    /// Tick until current reaches desired with the step line low; returns
    /// the number of ticks taken (at least one).
    pub fn settle(&mut self, limit: usize) -> usize {
        for n in 1..=limit {
            self.core.tick();
            let drive = self.core.drive();
            if drive.current_position() == drive.desired_position()
                && !drive.state().step_level()
            {
                return n;
            }
        }
        panic!("did not settle within {limit} ticks");
    }

    pub fn current(&self) -> i64 {
        self.core.drive().current_position()
    }

    pub fn desired(&self) -> i64 {
        self.core.drive().desired_position()
    }
}
