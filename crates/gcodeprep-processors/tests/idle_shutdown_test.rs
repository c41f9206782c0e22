use gcodeprep_core::gcode::{extract_tool_number, fingerprint_marker, parse_tool_temperature};
use gcodeprep_core::{GcodePreprocessor, PreprocessOutcome, ProcessingContext, ProcessorConfig};
use gcodeprep_processors::{IdleToolShutdown, MetadataExtractor, ProcessorRegistry};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

fn run_passes(processor: &IdleToolShutdown, text: &str) -> Vec<String> {
    let mut ctx = ProcessingContext::from_text("prop.gcode", text);
    processor.pre_process(Path::new("prop.gcode"), &mut ctx).unwrap();

    let mut out = Vec::new();
    for index in 0..ctx.total_lines() {
        ctx.set_current_line(index);
        let line = ctx.lines()[index].text.clone();
        out.extend(processor.process_line(&line, &ctx).unwrap());
    }
    out
}

#[test]
fn test_full_pipeline_with_both_processors() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("two_color.gcode");
    fs::write(
        &path,
        "; generated by PrusaSlicer 2.7.1+linux-x64 on 2024-02-01\n\
         PRINT_START TOOLS=!tools! COLORS=!colors!\n\
         T0\n\
         G1 X100 Y100 F3000\n\
         T1\n\
         G1 X50 Y50 F3000\n\
         T0\n\
         ; extruder_colour = #FF0000;#0000FF\n",
    )
    .unwrap();

    let registry = ProcessorRegistry::with_builtin();
    let pipeline = registry
        .create_pipeline(
            &[
                "metadata_extractor".to_string(),
                "idle_tool_shutdown".to_string(),
            ],
            &BTreeMap::new(),
        )
        .unwrap();

    let outcome = pipeline.run(&path).unwrap();
    let PreprocessOutcome::Processed(report) = outcome else {
        panic!("expected Processed, got {:?}", outcome);
    };
    assert_eq!(
        report
            .metadata
            .get("idle_tool_shutdown.planned_shutdowns")
            .and_then(|v| v.as_integer()),
        Some(1)
    );

    let expected = format!(
        "{}\n\
         ; generated by PrusaSlicer 2.7.1+linux-x64 on 2024-02-01\n\
         PRINT_START TOOLS=0,1 COLORS=#FF0000,#0000FF\n\
         T0\n\
         G1 X100 Y100 F3000\n\
         T1\n\
         G1 X50 Y50 F3000\n\
         T0\n\
         ; T1 no longer needed - shutting down\n\
         M104 T1 S0\n\
         ; extruder_colour = #FF0000;#0000FF\n",
        fingerprint_marker()
    );
    assert_eq!(fs::read_to_string(&path).unwrap(), expected);

    // A second run must not change a single byte
    let first = fs::read(&path).unwrap();
    assert!(matches!(
        pipeline.run(&path).unwrap(),
        PreprocessOutcome::AlreadyProcessed
    ));
    assert_eq!(fs::read(&path).unwrap(), first);
}

#[test]
fn test_predictive_scenario_through_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("long_swap.gcode");
    // T1 prints 6.2 minutes worth of moves (6 x 31mm at 30mm/min) before T0 returns
    let mut text = String::from("T0\nG1 X10 Y0 F3000\nT1\n");
    for i in 0..6 {
        let x = if i % 2 == 0 { 41.0 } else { 10.0 };
        text.push_str(&format!("G1 X{} F30\n", x));
    }
    text.push_str("T0\nG1 X0 F3000\n");
    fs::write(&path, &text).unwrap();

    let configs = BTreeMap::from([(
        "idle_tool_shutdown".to_string(),
        ProcessorConfig::new().with_option("idle_timeout_minutes", 5.0),
    )]);
    let pipeline = ProcessorRegistry::with_builtin()
        .create_pipeline(&["idle_tool_shutdown".to_string()], &configs)
        .unwrap();
    pipeline.run(&path).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    let switch = lines.iter().position(|l| *l == "T1").unwrap();
    assert_eq!(
        lines[switch + 1],
        "; T0 idle for an estimated 6.20 minutes - shutting down"
    );
    assert_eq!(lines[switch + 2], "M104 T0 S0");
    assert_eq!(content.matches("M104 T0 S0").count(), 1);
    assert_eq!(content.matches("M104").count(), 2);
    // T1 is switched away from for good at the final T0
    assert!(content.contains("M104 T1 S0"));
}

#[test]
fn test_metadata_from_pass_one_reaches_report() {
    let extractor = MetadataExtractor::new(ProcessorConfig::new()).unwrap();
    let mut ctx = ProcessingContext::from_text(
        "meta.gcode",
        "; generated by OrcaSlicer 2.1.0\nT0\nT1\nT0\n; filament_type = PLA;PETG\n",
    );
    extractor.pre_process(Path::new("meta.gcode"), &mut ctx).unwrap();

    assert_eq!(
        ctx.get_metadata("metadata_extractor.total_toolchanges")
            .and_then(|v| v.as_integer()),
        Some(3)
    );
    let materials = ctx
        .get_metadata("metadata_extractor.materials")
        .and_then(|v| v.as_tool_map())
        .unwrap();
    assert_eq!(materials.get(&1).map(String::as_str), Some("PETG"));
}

fn tool_program() -> impl Strategy<Value = (Vec<u32>, Vec<u32>)> {
    (
        prop::collection::vec(0u32..5, 1..40),
        prop::collection::vec(1u32..400, 40),
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// A tool that is switched away from after its last activation gets
    /// exactly one power-off, directly after that switch
    #[test]
    fn proptest_exactly_one_end_of_use(
        (tools, moves) in tool_program(),
        excluded in prop::collection::btree_set(0u32..5, 0..2)
    ) {
        let mut text = String::new();
        for (i, tool) in tools.iter().enumerate() {
            text.push_str(&format!("T{}\nG1 X{} F1200\n", tool, moves[i % moves.len()]));
        }

        let excluded_list: Vec<u32> = excluded.iter().copied().collect();
        let processor = IdleToolShutdown::new(
            ProcessorConfig::new().with_option("exclude_tools", serde_json::json!(excluded_list)),
        )
        .unwrap();
        let out = run_passes(&processor, &text);

        for tool in 0u32..5 {
            let command = format!("M104 T{} S0\n", tool);
            let positions: Vec<usize> = out
                .iter()
                .enumerate()
                .filter(|(_, line)| **line == command)
                .map(|(i, _)| i)
                .collect();

            let last = tools.iter().rposition(|t| *t == tool);
            let switched_away = last.is_some_and(|l| tools[l + 1..].iter().any(|t| *t != tool));

            if excluded.contains(&tool) || !switched_away {
                prop_assert!(positions.is_empty(), "unexpected shutdown for T{}", tool);
                continue;
            }
            prop_assert_eq!(positions.len(), 1, "T{} needs exactly one shutdown", tool);

            // Preceded by its comment, which follows the switch line
            let at = positions[0];
            let expected_comment = format!("; T{} no longer needed", tool);
            prop_assert!(out[at - 1].starts_with(&expected_comment));
            let switch_line = &out[at - 2];
            let switched_to = extract_tool_number(switch_line);
            prop_assert!(switched_to.is_some() && switched_to != Some(tool));

            // No activation of the tool after its shutdown
            prop_assert!(out[at..]
                .iter()
                .all(|line| extract_tool_number(line) != Some(tool)));
        }
    }

    /// Predictive shutdowns only ever fire at a switch away from the tool
    #[test]
    fn proptest_predictive_only_at_switch(
        (tools, moves) in tool_program(),
        threshold in 0.01f64..0.5
    ) {
        let mut text = String::new();
        for (i, tool) in tools.iter().enumerate() {
            text.push_str(&format!("T{}\nG1 X{} F1200\n", tool, moves[i % moves.len()]));
        }
        let processor = IdleToolShutdown::new(
            ProcessorConfig::new().with_option("idle_timeout_minutes", threshold),
        )
        .unwrap();
        let out = run_passes(&processor, &text);

        for (i, line) in out.iter().enumerate() {
            if !line.starts_with("M104 T") {
                continue;
            }
            let tool: u32 = line["M104 T".len()..]
                .split_whitespace()
                .next()
                .and_then(|n| n.parse().ok())
                .unwrap();
            let switch = extract_tool_number(&out[i - 2]);
            prop_assert!(switch.is_some() && switch != Some(tool));
        }
    }

    /// Once powered off, a tool gets no further power-off until a command
    /// heats it again
    #[test]
    fn proptest_no_repeat_power_off_without_reheat(
        (tools, moves) in tool_program(),
        reheat in prop::collection::vec(any::<bool>(), 40),
        threshold in 0.01f64..0.5
    ) {
        let mut text = String::new();
        for (i, tool) in tools.iter().enumerate() {
            if reheat[i % reheat.len()] {
                text.push_str(&format!("M109 T{} S215\n", tool));
            }
            text.push_str(&format!("T{}\nG1 X{} F1200\n", tool, moves[i % moves.len()]));
        }
        let processor = IdleToolShutdown::new(
            ProcessorConfig::new().with_option("idle_timeout_minutes", threshold),
        )
        .unwrap();
        let out = run_passes(&processor, &text);

        let mut off = BTreeSet::new();
        for line in &out {
            let Some(command) = parse_tool_temperature(line) else {
                continue;
            };
            if command.is_heating() {
                off.remove(&command.tool);
            } else {
                prop_assert!(off.insert(command.tool), "T{} powered off twice", command.tool);
            }
        }
    }
}
