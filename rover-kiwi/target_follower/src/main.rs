use dora_node_api::{
    arrow::array::BinaryArray,
    dora_core::config::DataId,
    DoraNode,
    Event,
};
use eyre::{Context, Result};
use robo_follower_lib::{
    init_tracing,
    types::{DetectionFrame, TrackingCommand},
    wire::{encode_command, STOP_LINE},
    FollowerConfig, FollowerPipeline, GhostExpiry,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

const DETECTIONS_INPUT: &str = "detections";

/// Only losing the detection stream ends the node; command inputs are optional
fn closes_session(input: &str) -> bool {
    input == DETECTIONS_INPUT
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn send_bytes(node: &mut DoraNode, output: &str, bytes: &[u8]) -> Result<()> {
    let data = BinaryArray::from_vec(vec![bytes]);
    node.send_output(DataId::from(output.to_owned()), Default::default(), data)
        .wrap_err_with(|| format!("Failed to send {}", output))
}

fn send_json<T: Serialize>(node: &mut DoraNode, output: &str, value: &T) -> Result<()> {
    let json = serde_json::to_vec(value)?;
    send_bytes(node, output, &json)
}

fn send_telemetry(node: &mut DoraNode, pipeline: &FollowerPipeline) -> Result<()> {
    send_json(node, "tracking_telemetry", &pipeline.telemetry(now_millis()))
}

fn log_config(config: &FollowerConfig) {
    info!("Configuration:");
    info!("  Max tracking distance: {} px", config.tracker.max_tracking_distance);
    info!("  Ghost after: {} missed frames", config.tracker.ghost_missed_frame_threshold);
    match config.tracker.ghost_expiry {
        GhostExpiry::Frames(frames) => info!("  Ghost expiry: {} frames", frames),
        GhostExpiry::Time { duration, frame_rate } => info!(
            "  Ghost expiry: {:.1}s at {} fps ({} frames)",
            duration.as_secs_f32(),
            frame_rate,
            config.tracker.ghost_expiry.as_frames()
        ),
    }
    info!("  Class gated matching: {}", config.tracker.class_gated);
    info!("  Prefer ghost continuity: {}", config.selector.prefer_ghost_continuity);
    info!(
        "  Gains: kp_steer={} kp_throttle={} target_width_ratio={} limit={}",
        config.controller.kp_steer,
        config.controller.kp_throttle,
        config.controller.target_width_ratio,
        config.controller.output_limit
    );
    if config.filter_enabled {
        info!(
            "  Detection filter: classes={:?} min_conf={} min_size={}px margin={}px",
            config.filter.target_classes,
            config.filter.min_confidence,
            config.filter.min_box_size,
            config.filter.border_margin
        );
    } else {
        info!("  Detection filter: disabled (upstream filters)");
    }
}

fn main() -> Result<()> {
    let _guard = init_tracing();

    info!("Starting target_follower node");

    let config = FollowerConfig::from_env().context("Invalid follower configuration")?;
    log_config(&config);

    let mut pipeline = FollowerPipeline::new(config);

    let (mut node, mut events) = DoraNode::init_from_env()?;
    info!("Dora node initialized");

    while let Some(event) = events.recv() {
        match event {
            Event::Input { id, data, .. } => match id.as_str() {
                DETECTIONS_INPUT => {
                    let binary_data = if let Some(array) = data.as_any().downcast_ref::<BinaryArray>() {
                        array.value(0)
                    } else {
                        error!("Failed to cast detections to BinaryArray");
                        continue;
                    };

                    let frame: DetectionFrame = match serde_json::from_slice(binary_data) {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!("Failed to deserialize detection frame: {:?}", e);
                            continue;
                        }
                    };

                    debug!(
                        "Frame {}: {} detections ({}x{})",
                        frame.frame_index,
                        frame.detections.len(),
                        frame.width,
                        frame.height
                    );

                    let outcome = pipeline.step(&frame);

                    send_json(&mut node, "control", &outcome.control.vector)?;
                    send_bytes(
                        &mut node,
                        "motor_command",
                        encode_command(&outcome.control.vector).as_bytes(),
                    )?;
                    send_telemetry(&mut node, &pipeline)?;
                }
                "tracking_command" | "tracking_command_voice" => {
                    let binary_data = if let Some(array) = data.as_any().downcast_ref::<BinaryArray>() {
                        array.value(0)
                    } else {
                        error!("Failed to cast tracking_command to BinaryArray");
                        continue;
                    };

                    let command: TrackingCommand = match serde_json::from_slice(binary_data) {
                        Ok(cmd) => cmd,
                        Err(e) => {
                            error!("Failed to deserialize tracking command: {:?}", e);
                            continue;
                        }
                    };

                    let source = if id.as_str() == "tracking_command_voice" { "voice" } else { "web" };
                    debug!("Received {} tracking command: {:?}", source, command);
                    pipeline.handle_command(command);

                    if !pipeline.is_enabled() {
                        send_bytes(&mut node, "motor_command", STOP_LINE.as_bytes())?;
                    }
                    send_telemetry(&mut node, &pipeline)?;
                }
                other => {
                    warn!("Received unexpected input: {}", other);
                }
            },
            Event::InputClosed { id } => {
                if closes_session(id.as_str()) {
                    info!("Input {} closed", id);
                    break;
                }
                info!("Input {} closed, still following detections", id);
            }
            Event::Stop(_) => {
                info!("Received stop signal");
                break;
            }
            other => {
                debug!("Received other event: {:?}", other);
            }
        }
    }

    // Leave the motors stopped whatever the last command was
    if let Err(e) = send_bytes(&mut node, "motor_command", STOP_LINE.as_bytes()) {
        warn!("Could not send final stop command: {:?}", e);
    }

    info!("Target follower node shutting down");
    Ok(())
}
