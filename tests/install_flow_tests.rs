/// Install flow tests
///
/// End-to-end install sagas driven through the public facade against
/// scripted collaborators.
/// Run with: cargo test --test install_flow_tests


use chrono::Utc;
use lifecycle_utils::*;
use modlift::{LifecycleError, LifecycleEvent, ModStatus};

#[tokio::test]
async fn test_install_with_intervention_deploys_selection() {
    let h = harness();
    h.steam.put_item("123", "CUP Weapons", Utc::now());
    h.files.set_discovered("123", &["mod1.pbo", "mod2.pbo"]);
    let mut events = h.orchestrator.subscribe();

    let accepted = h.orchestrator.install("123", false).await.unwrap();
    assert_eq!(accepted.status, ModStatus::Installing);
    assert_eq!(
        accepted.status_message.as_deref(),
        Some("Preparing to install...")
    );
    assert_eq!(accepted.name, "CUP Weapons");

    let check = wait_for_event(&mut events, |e| {
        matches!(e, LifecycleEvent::CheckComplete { .. })
    })
    .await;
    match check {
        LifecycleEvent::CheckComplete {
            intervention_required,
            available_pbos,
            ..
        } => {
            assert!(intervention_required);
            assert_eq!(available_pbos, names(&["mod1.pbo", "mod2.pbo"]));
        }
        _ => unreachable!(),
    }

    let waiting = wait_for_status(&h.orchestrator, "123", ModStatus::InterventionRequired).await;
    assert_eq!(
        waiting.status_message.as_deref(),
        Some("Select PBOs to install")
    );
    assert_eq!(waiting.available_pbos, names(&["mod1.pbo", "mod2.pbo"]));

    h.orchestrator
        .resolve_intervention("123", Some(names(&["mod1.pbo"])))
        .await
        .unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, LifecycleEvent::CleanupComplete { .. })
    })
    .await;

    let done = h.orchestrator.mod_record("123").await.unwrap();
    assert_eq!(done.status, ModStatus::InstalledPendingRelease);
    assert_eq!(
        done.status_message.as_deref(),
        Some("Installed pending next modpack release")
    );
    assert_eq!(done.pbos, names(&["mod1.pbo"]));
    assert!(done.error_message.is_none());
    assert!(done.last_updated_locally.is_none());

    let calls = h.files.calls();
    assert!(calls.contains(&FileCall::Download("123".to_string())));
    assert!(calls.contains(&FileCall::CopyFiles(names(&["mod1.pbo"]))));
    assert!(calls.contains(&FileCall::DeleteWorkingDir("123".to_string())));
    assert_eq!(h.builds.triggers(), 1);

    h.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_root_mod_install_skips_intervention() {
    let h = harness();
    h.steam.put_item("555", "RHS AFRF", Utc::now());
    let mut events = h.orchestrator.subscribe();

    h.orchestrator.install("555", true).await.unwrap();

    let complete = wait_for_event(&mut events, |e| {
        matches!(e, LifecycleEvent::InstallComplete { .. })
    })
    .await;
    match complete {
        LifecycleEvent::InstallComplete { files_changed, .. } => assert!(files_changed),
        _ => unreachable!(),
    }
    wait_for_event(&mut events, |e| {
        matches!(e, LifecycleEvent::CleanupComplete { .. })
    })
    .await;

    let done = h.orchestrator.mod_record("555").await.unwrap();
    assert_eq!(done.status, ModStatus::InstalledPendingRelease);
    assert!(done.pbos.is_empty());
    assert!(done.available_pbos.is_empty());
    assert!(
        h.files
            .calls()
            .contains(&FileCall::CopyRoot("555".to_string()))
    );

    h.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_install_without_archives_completes_without_intervention() {
    let h = harness();
    h.steam.put_item("77", "Empty Mod", Utc::now());
    let mut events = h.orchestrator.subscribe();

    h.orchestrator.install("77", false).await.unwrap();

    let check = wait_for_event(&mut events, |e| {
        matches!(e, LifecycleEvent::CheckComplete { .. })
    })
    .await;
    match check {
        LifecycleEvent::CheckComplete {
            intervention_required,
            ..
        } => assert!(!intervention_required),
        _ => unreachable!(),
    }
    wait_for_event(&mut events, |e| {
        matches!(e, LifecycleEvent::CleanupComplete { .. })
    })
    .await;

    let done = h.orchestrator.mod_record("77").await.unwrap();
    assert_eq!(done.status, ModStatus::InstalledPendingRelease);
    assert!(done.pbos.is_empty());

    h.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_install_rejected_while_record_live() {
    let h = harness();
    h.steam.put_item("123", "CBA_A3", Utc::now());
    let mut events = h.orchestrator.subscribe();

    h.orchestrator.install("123", true).await.unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, LifecycleEvent::CleanupComplete { .. })
    })
    .await;

    let result = h.orchestrator.install("123", true).await;
    assert!(matches!(result, Err(LifecycleError::Rejected(_))));

    h.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_install_unknown_item_not_found() {
    let h = harness();

    let result = h.orchestrator.install("404404", false).await;
    assert!(matches!(result, Err(LifecycleError::ItemUnavailable(_))));
    assert!(h.orchestrator.mod_record("404404").await.is_none());

    h.orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_second_command_rejected_while_in_flight() {
    let h = harness();
    h.steam.put_item("123", "ACE", Utc::now());
    h.files.set_download(DownloadBehavior::BlockUntilCancelled);
    let mut events = h.orchestrator.subscribe();

    h.orchestrator.install("123", false).await.unwrap();
    wait_for_status_message(&h.orchestrator, "123", "Downloading...").await;

    assert!(matches!(
        h.orchestrator.install("123", false).await,
        Err(LifecycleError::Rejected(_))
    ));
    assert!(matches!(
        h.orchestrator.update("123").await,
        Err(LifecycleError::Rejected(_))
    ));
    assert!(matches!(
        h.orchestrator.uninstall("123").await,
        Err(LifecycleError::Rejected(_))
    ));

    h.orchestrator.cancel("123").unwrap();
    wait_for_event(&mut events, |e| {
        matches!(e, LifecycleEvent::Faulted { .. })
    })
    .await;

    h.orchestrator.shutdown().await.unwrap();
}
