mod scripted;

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use consent_core::{
    load_settings, ConsentDependencies, ConsentRequestOptions, ConsentSettings, RequestCoordinator,
};
use scripted::{ScriptedPlatform, ScriptedProbe, ScriptedSource};
use shared::{
    domain::{FlowStateTag, StatusCode},
    protocol::{ApprovalTrigger, ConsentReply, DetectionEvent, RawApprovalResult},
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    Approve,
    Empty,
    Deny,
    Timeout,
    DetectionError,
    MissingTrigger,
    LaunchFailure,
    StartFailure,
    Unavailable,
    Supersede,
    Shutdown,
}

/// Replays one consent scenario against in-memory collaborators and prints each
/// reply as JSON.
#[derive(Parser, Debug)]
struct Args {
    #[arg(long, value_enum, default_value_t = Scenario::Approve)]
    scenario: Scenario,
    #[arg(long, default_value = "Your verification code is 123456")]
    message: String,
    #[arg(long)]
    sender: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let args = Args::parse();
    let settings = load_settings();

    let source = Arc::new(ScriptedSource::default());
    let dependencies = ConsentDependencies::new(
        Arc::new(ScriptedProbe {
            available: args.scenario != Scenario::Unavailable,
        }),
        source.clone(),
        Arc::new(ScriptedPlatform {
            fail_watch: args.scenario == Scenario::StartFailure,
            fail_launch: args.scenario == Scenario::LaunchFailure,
        }),
    );
    let coordinator = RequestCoordinator::start(dependencies, settings.clone());

    let options = ConsentRequestOptions {
        sender_hint: args.sender.clone(),
    };
    let replies = run_scenario(&args, &settings, &coordinator, &source, options).await;
    for reply in replies {
        println!("{}", serde_json::to_string(&reply)?);
    }

    coordinator.shutdown().await;
    Ok(())
}

async fn run_scenario(
    args: &Args,
    settings: &ConsentSettings,
    coordinator: &RequestCoordinator,
    source: &ScriptedSource,
    options: ConsentRequestOptions,
) -> Vec<ConsentReply> {
    let action = settings.detection_action.as_str();
    let mut replies = Vec::new();
    let first = coordinator.request_with(options.clone());
    coordinator.snapshot().await;

    match args.scenario {
        Scenario::Approve | Scenario::Empty | Scenario::Deny | Scenario::LaunchFailure => {
            source.broadcast(
                DetectionEvent::new(action, StatusCode::SUCCESS)
                    .with_trigger(ApprovalTrigger("consent-intent".into())),
            );
            let launched = coordinator
                .snapshot()
                .await
                .filter(|snapshot| snapshot.state == FlowStateTag::Approving)
                .and_then(|snapshot| snapshot.approval_request_code);
            if let Some(request_code) = launched {
                let result = match args.scenario {
                    Scenario::Deny => RawApprovalResult::canceled(),
                    Scenario::Empty => RawApprovalResult::approved(""),
                    _ => RawApprovalResult::approved(args.message.clone()),
                };
                coordinator.deliver_approval_result(request_code, result);
            }
        }
        Scenario::Timeout => source.broadcast(DetectionEvent::new(action, StatusCode::TIMEOUT)),
        Scenario::DetectionError => {
            source.broadcast(DetectionEvent::new(action, StatusCode::INTERNAL_ERROR))
        }
        Scenario::MissingTrigger => {
            source.broadcast(DetectionEvent::new(action, StatusCode::SUCCESS))
        }
        Scenario::StartFailure | Scenario::Unavailable => {}
        Scenario::Supersede => {
            let second = coordinator.request_with(options);
            replies.push(ConsentReply::from_result(&first.await));
            source.broadcast(DetectionEvent::new(action, StatusCode::TIMEOUT));
            replies.push(ConsentReply::from_result(&second.await));
            return replies;
        }
        Scenario::Shutdown => coordinator.shutdown().await,
    }

    replies.push(ConsentReply::from_result(&first.await));
    replies
}
