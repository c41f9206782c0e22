//! Idle tool shutdown
//!
//! Inserts a tool power-off instruction at the point a tool becomes idle,
//! under two policies:
//!
//! - **End of use**: right after the first activation of another tool that
//!   follows the tool's last activation. A tool that is never switched away
//!   from gets no instruction.
//! - **Predictive** (`idle_timeout_minutes > 0`): at every earlier switch away
//!   from the tool, if the estimated time until the tool is activated again is
//!   longer than the threshold.
//!
//! Each idle interval of a tool starts at exactly one switch line, so at most
//! one instruction is ever planned per interval. A tool powered off by the
//! predictive policy stays off until a `M104`/`M109 T<n> S<temp>` line heats
//! it again; no further instruction is planned for it in between, including
//! its end-of-use one. All decisions are made in
//! `pre_process`; `process_line` only looks up the current source line in the
//! resulting [`ShutdownPlan`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use gcodeprep_core::gcode::line::{has_terminator, strip_terminator};
use gcodeprep_core::gcode::patterns;
use gcodeprep_core::{
    GcodePreprocessor, MetadataValue, PluginError, ProcessingContext, ProcessorConfig,
};

use crate::estimator::{MotionEstimator, DEFAULT_FEEDRATE};

/// Registered name of the idle shutdown processor
pub const NAME: &str = "idle_tool_shutdown";

/// Default power-off instruction; `{tool}` is replaced by the tool number
pub const DEFAULT_SHUTDOWN_COMMAND: &str = "M104 T{tool} S0";

/// Why a tool is being shut down
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShutdownReason {
    /// The tool is not used again
    EndOfUse,
    /// The tool will idle for an estimated number of minutes
    Idle { minutes: f64 },
}

/// A planned power-off, emitted after the switch line it is keyed by
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShutdownPoint {
    /// Tool to power off
    pub tool: u32,
    /// Tool activated by the switch line
    pub switch_to: u32,
    pub reason: ShutdownReason,
}

/// One stretch during which a tool is the active tool
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolInterval {
    pub tool: u32,
    /// Line that activated the tool
    pub activation_line: usize,
    /// Last selection of the tool before the switch away
    pub last_selection_line: usize,
    /// First activation of a different tool, `None` if the file ends first
    pub switch_away_line: Option<usize>,
    /// Next activation of the same tool, `None` if it is never used again
    pub next_activation_line: Option<usize>,
    /// Estimated minutes between the switch away and the next activation
    pub idle_minutes: Option<f64>,
}

/// Activation intervals of every tool, in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolTimeline {
    pub intervals: Vec<ToolInterval>,
}

impl ToolTimeline {
    /// Build the timeline from activation events
    ///
    /// `events` are `(line, tool)` pairs in line order; `times` holds the
    /// elapsed minutes before each line. Re-activating the tool that is already
    /// active does not start a new interval.
    pub fn build(events: &[(usize, u32)], times: &[f64]) -> Self {
        let mut intervals: Vec<ToolInterval> = Vec::new();

        for &(line, tool) in events {
            if let Some(current) = intervals.last_mut() {
                if current.tool == tool {
                    current.last_selection_line = line;
                    continue;
                }
                current.switch_away_line = Some(line);
            }
            intervals.push(ToolInterval {
                tool,
                activation_line: line,
                last_selection_line: line,
                switch_away_line: None,
                next_activation_line: None,
                idle_minutes: None,
            });
        }

        let mut next_by_tool: BTreeMap<u32, usize> = BTreeMap::new();
        for interval in intervals.iter_mut().rev() {
            interval.next_activation_line = next_by_tool.get(&interval.tool).copied();
            if let (Some(away), Some(next)) =
                (interval.switch_away_line, interval.next_activation_line)
            {
                let start = times.get(away).copied().unwrap_or(0.0);
                let end = times.get(next).copied().unwrap_or(start);
                interval.idle_minutes = Some(end - start);
            }
            next_by_tool.insert(interval.tool, interval.activation_line);
        }

        Self { intervals }
    }

    /// Tools that appear in the timeline
    pub fn tools(&self) -> BTreeSet<u32> {
        self.intervals.iter().map(|i| i.tool).collect()
    }

    /// Last activation line of every tool
    pub fn last_activation(&self) -> BTreeMap<u32, usize> {
        self.intervals
            .iter()
            .map(|i| (i.tool, i.last_selection_line))
            .collect()
    }
}

/// Planned power-offs keyed by source line index
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShutdownPlan {
    points: BTreeMap<usize, ShutdownPoint>,
}

impl ShutdownPlan {
    pub fn get(&self, line: usize) -> Option<&ShutdownPoint> {
        self.points.get(&line)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ShutdownPoint)> {
        self.points.iter().map(|(line, point)| (*line, point))
    }
}

/// Shuts tools down once they are idle
#[derive(Debug, Clone)]
pub struct IdleToolShutdown {
    config: ProcessorConfig,
    idle_timeout_minutes: f64,
    exclude_tools: BTreeSet<u32>,
    initial_feedrate: f64,
    include_dwell: bool,
    emit_comments: bool,
    shutdown_command: String,
}

impl IdleToolShutdown {
    /// Create the processor from its configuration
    pub fn new(config: ProcessorConfig) -> Result<Self, PluginError> {
        let idle_timeout_minutes = config.get_f64("idle_timeout_minutes", 0.0)?;
        if !idle_timeout_minutes.is_finite() || idle_timeout_minutes < 0.0 {
            return Err(PluginError::invalid_option(
                "idle_timeout_minutes",
                "must be zero or a positive number of minutes",
            ));
        }

        let initial_feedrate = config.get_f64("initial_feedrate", DEFAULT_FEEDRATE)?;
        if !initial_feedrate.is_finite() || initial_feedrate <= 0.0 {
            return Err(PluginError::invalid_option(
                "initial_feedrate",
                "must be a positive feed rate",
            ));
        }

        let shutdown_command = config
            .get_str("shutdown_command")
            .unwrap_or(DEFAULT_SHUTDOWN_COMMAND)
            .trim()
            .to_string();
        if shutdown_command.is_empty() {
            return Err(PluginError::invalid_option("shutdown_command", "must not be empty"));
        }

        Ok(Self {
            exclude_tools: config.get_tool_set("exclude_tools")?,
            include_dwell: config.get_bool("include_dwell", false)?,
            emit_comments: config.get_bool("emit_comments", true)?,
            idle_timeout_minutes,
            initial_feedrate,
            shutdown_command,
            config,
        })
    }

    /// Whether predictive shutdown is active
    pub fn predictive(&self) -> bool {
        self.idle_timeout_minutes > 0.0
    }

    /// Decide every shutdown point for a timeline
    ///
    /// `reheats` are `(line, tool)` pairs, in line order, of commands that set
    /// a tool's heater above zero.
    pub fn plan(&self, timeline: &ToolTimeline, reheats: &[(usize, u32)]) -> ShutdownPlan {
        let mut plan = ShutdownPlan::default();
        let intervals = &timeline.intervals;
        let mut reheats = reheats.iter().peekable();
        let mut powered_off: BTreeSet<u32> = BTreeSet::new();

        for (i, interval) in intervals.iter().enumerate() {
            let Some(away) = interval.switch_away_line else {
                continue;
            };
            while let Some(&(line, tool)) = reheats.next_if(|&&(line, _)| line <= away) {
                if powered_off.remove(&tool) {
                    tracing::debug!("{}: T{} heated again at line {}", NAME, tool, line + 1);
                }
            }
            if self.exclude_tools.contains(&interval.tool) {
                continue;
            }
            let Some(switch_to) = intervals.get(i + 1).map(|next| next.tool) else {
                continue;
            };
            if powered_off.contains(&interval.tool) {
                continue;
            }

            let reason = match (interval.next_activation_line, interval.idle_minutes) {
                (None, _) => ShutdownReason::EndOfUse,
                (Some(_), Some(minutes))
                    if self.predictive() && minutes > self.idle_timeout_minutes =>
                {
                    powered_off.insert(interval.tool);
                    ShutdownReason::Idle { minutes }
                }
                _ => continue,
            };

            plan.points.insert(
                away,
                ShutdownPoint {
                    tool: interval.tool,
                    switch_to,
                    reason,
                },
            );
        }

        plan
    }

    /// Lines inserted after a switch line for one shutdown point
    fn shutdown_lines(&self, point: &ShutdownPoint, context: &ProcessingContext) -> Vec<String> {
        let terminator = context.terminator();
        let mut lines = Vec::with_capacity(2);

        if self.emit_comments {
            let comment = match point.reason {
                ShutdownReason::EndOfUse => {
                    format!("; T{} no longer needed - shutting down", point.tool)
                }
                ShutdownReason::Idle { minutes } => format!(
                    "; T{} idle for an estimated {:.2} minutes - shutting down",
                    point.tool, minutes
                ),
            };
            lines.push(terminator.terminate(&comment));
        }

        let command = self
            .shutdown_command
            .replace("{tool}", &point.tool.to_string());
        lines.push(terminator.terminate(&command));
        lines
    }
}

impl GcodePreprocessor for IdleToolShutdown {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> String {
        if self.predictive() {
            format!(
                "Shuts down tools after their last use or when idle longer than {} minutes",
                self.idle_timeout_minutes
            )
        } else {
            "Shuts down tools after their last use".to_string()
        }
    }

    fn pre_process(
        &self,
        _path: &Path,
        context: &mut ProcessingContext,
    ) -> Result<(), PluginError> {
        let events: Vec<(usize, u32)> = context
            .ensure_tool_usage()
            .iter()
            .map(|event| (event.line_index, event.tool_id))
            .collect();

        let times = MotionEstimator::new(self.initial_feedrate)
            .with_dwell(self.include_dwell)
            .timeline(context.lines());
        let reheats: Vec<(usize, u32)> = context
            .lines()
            .iter()
            .filter_map(|line| {
                patterns::parse_tool_temperature(&line.text)
                    .filter(|command| command.is_heating())
                    .map(|command| (line.index, command.tool))
            })
            .collect();

        let timeline = ToolTimeline::build(&events, &times);
        let plan = self.plan(&timeline, &reheats);

        let tools = timeline.tools();
        tracing::info!(
            "{}: {} tools used {:?}, excluded {:?}",
            NAME,
            tools.len(),
            tools,
            self.exclude_tools
        );
        if self.predictive() {
            tracing::info!(
                "{}: estimated print time {:.2} minutes, idle threshold {} minutes",
                NAME,
                times.last().copied().unwrap_or(0.0),
                self.idle_timeout_minutes
            );
        }
        for (line, point) in plan.iter() {
            tracing::debug!(
                "{}: T{} shutdown planned after line {} ({:?})",
                NAME,
                point.tool,
                line + 1,
                point.reason
            );
        }

        context.set_metadata(
            format!("{}.tools_used", NAME),
            MetadataValue::IntegerList(tools.iter().map(|&t| i64::from(t)).collect()),
        );
        context.set_metadata(
            format!("{}.tool_last_usage", NAME),
            MetadataValue::ToolMap(
                timeline
                    .last_activation()
                    .into_iter()
                    .map(|(tool, line)| (tool, (line + 1).to_string()))
                    .collect(),
            ),
        );
        context.set_metadata(
            format!("{}.estimated_minutes", NAME),
            MetadataValue::Float(times.last().copied().unwrap_or(0.0)),
        );
        context.set_metadata(
            format!("{}.planned_shutdowns", NAME),
            MetadataValue::Integer(plan.len() as i64),
        );

        context.insert_extension(plan);
        Ok(())
    }

    fn process_line(
        &self,
        line: &str,
        context: &ProcessingContext,
    ) -> Result<Vec<String>, PluginError> {
        let point = context
            .extension::<ShutdownPlan>()
            .and_then(|plan| plan.get(context.current_line()));

        let Some(point) = point else {
            return Ok(vec![line.to_string()]);
        };
        if patterns::extract_tool_number(line) != Some(point.switch_to) {
            return Ok(vec![line.to_string()]);
        }

        let mut output = Vec::with_capacity(3);
        if has_terminator(line) {
            output.push(line.to_string());
        } else {
            output.push(context.terminator().terminate(strip_terminator(line)));
        }
        output.extend(self.shutdown_lines(point, context));

        tracing::debug!(
            "{}: inserted shutdown for T{} after line {}",
            NAME,
            point.tool,
            context.current_line() + 1
        );
        Ok(output)
    }

    fn post_process(&self, _path: &Path, context: &ProcessingContext) -> Result<(), PluginError> {
        let planned = context
            .extension::<ShutdownPlan>()
            .map(ShutdownPlan::len)
            .unwrap_or(0);
        tracing::info!("{}: {} shutdown instructions planned", NAME, planned);
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}
