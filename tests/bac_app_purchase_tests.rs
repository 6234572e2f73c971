//! BAC sign-off, APP gate and purchase request spin-off

mod fixtures;

use fixtures::{PlannerFixture, FISCAL_YEAR};
use ppmp_planner::error::{ConflictKind, PlannerError};
use ppmp_planner::model::{AppStatus, ItemKey, BAC_APPROVAL_ACTION};
use ppmp_planner::workflow::WorkflowAction;
use ppmp_planner::RecordStore;

#[tokio::test]
async fn test_bac_member_approves_once() {
    let f = PlannerFixture::new().await;
    let (ppmp, _) = f.at_bac().await;

    f.planner.bac().approve(ppmp.id, f.bac_member.id).await.unwrap();
    let err = f
        .planner
        .bac()
        .approve(ppmp.id, f.bac_member.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PlannerError::Conflict(ConflictKind::AlreadyApproved { .. })
    ));

    let approvals = f.store.list_bac_approvals(ppmp.id).await.unwrap();
    assert_eq!(approvals.len(), 1);

    let history = f.planner.workflow().history(ppmp.id).await.unwrap();
    let bac_entries = history
        .iter()
        .filter(|e| e.action == BAC_APPROVAL_ACTION)
        .count();
    assert_eq!(bac_entries, 1);
}

#[tokio::test]
async fn test_bac_gate_is_n_of_n_and_does_not_advance() {
    let f = PlannerFixture::new().await;
    let (ppmp, _) = f.at_bac().await;

    let status = f.planner.bac().status(ppmp.id).await.unwrap();
    assert_eq!(status.required(), 2);
    assert_eq!(status.approved(), 0);

    f.planner.bac().approve(ppmp.id, f.bac_chair.id).await.unwrap();
    assert!(!f.planner.bac().all_approved(ppmp.id).await.unwrap());

    f.planner.bac().approve(ppmp.id, f.bac_member.id).await.unwrap();
    let status = f.planner.bac().status(ppmp.id).await.unwrap();
    assert!(status.all_approved());
    assert!(status.has_approved(f.bac_member.id));

    let header = f.planner.ppmps().get(ppmp.id).await.unwrap();
    assert_eq!(header.status, ppmp.status);
}

#[tokio::test]
async fn test_non_bac_user_cannot_approve() {
    let f = PlannerFixture::new().await;
    let (ppmp, _) = f.at_bac().await;

    let err = f.planner.bac().approve(ppmp.id, f.budget.id).await.unwrap_err();
    assert!(err.is_unauthorized());
    assert!(f.store.list_bac_approvals(ppmp.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_plain_member_cannot_forward_to_hope() {
    let f = PlannerFixture::new().await;
    let (ppmp, _) = f.at_bac().await;

    let err = f
        .planner
        .transition(ppmp.id, f.bac_member.id, WorkflowAction::SubmitToHope, None)
        .await
        .unwrap_err();
    assert!(err.is_unauthorized());
}

#[tokio::test]
async fn test_app_gate_opens_only_when_every_row_is_approved() {
    let f = PlannerFixture::new().await;
    let app = f.planner.app();

    let gate = app.gate(FISCAL_YEAR).await.unwrap();
    assert_eq!(gate.total_rows, 0);
    assert!(!gate.is_enabled());
    assert!(app.approve_app(FISCAL_YEAR, f.hope.id).await.unwrap_err().is_validation());

    let (_, row) = f.approved().await;
    let gate = app.gate(FISCAL_YEAR).await.unwrap();
    assert_eq!((gate.total_rows, gate.pending_rows), (1, 1));
    assert!(!gate.is_enabled());

    app.approve_row(row.id, f.bac_chair.id).await.unwrap();
    let gate = app.gate(FISCAL_YEAR).await.unwrap();
    assert!(gate.is_enabled());

    assert!(app
        .approve_app(FISCAL_YEAR, f.budget.id)
        .await
        .unwrap_err()
        .is_unauthorized());
    let approval = app.approve_app(FISCAL_YEAR, f.hope.id).await.unwrap();
    assert_eq!(approval.approved_by_user_id, Some(f.hope.id));
    assert!(approval.approved_at.is_some());

    let gate = app.gate(FISCAL_YEAR).await.unwrap();
    assert!(gate.is_approved());
    assert!(!gate.is_enabled());
    let again = app.approve_app(FISCAL_YEAR, f.hope.id).await.unwrap_err();
    assert!(matches!(
        again,
        PlannerError::Conflict(ConflictKind::AppAlreadyApproved { .. })
    ));

    // Approval is never cleared: rows can no longer go back to pending
    let err = app.mark_row_pending(row.id, f.hope.id).await.unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(
        app.approval(FISCAL_YEAR).await.unwrap().unwrap().approved_at,
        approval.approved_at
    );
}

#[tokio::test]
async fn test_row_status_changes_need_an_approved_ppmp() {
    let f = PlannerFixture::new().await;
    let (_, row) = f.at_bac().await;

    let err = f.planner.app().approve_row(row.id, f.hope.id).await.unwrap_err();
    assert!(matches!(err, PlannerError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_row_pending_round_trip_before_app_approval() {
    let f = PlannerFixture::new().await;
    let (_, row) = f.approved().await;
    let app = f.planner.app();

    let approved = app.approve_row(row.id, f.bac_member.id).await.unwrap();
    assert_eq!(approved.app_status, AppStatus::Approved);
    assert!(matches!(
        app.approve_row(row.id, f.bac_member.id).await.unwrap_err(),
        PlannerError::InvalidTransition { .. }
    ));

    let pending = app.mark_row_pending(row.id, f.hope.id).await.unwrap();
    assert_eq!(pending.app_status, AppStatus::Pending);
    assert!(app
        .approve_row(row.id, f.proponent.id)
        .await
        .unwrap_err()
        .is_unauthorized());
}

#[tokio::test]
async fn test_purchase_request_claims_selected_items() {
    let f = PlannerFixture::new().await;
    let (ppmp, row) = f.approved().await;
    f.planner.app().approve_row(row.id, f.hope.id).await.unwrap();
    f.planner.app().approve_app(FISCAL_YEAR, f.hope.id).await.unwrap();

    let prs = f.planner.purchase_requests();
    assert!(prs.can_create(row.id, f.proponent.id).await.unwrap());
    assert!(!prs.can_create(row.id, f.head.id).await.unwrap());

    let keys = [ItemKey::new(0, 0), ItemKey::new(1, 2)];
    let created = prs.create(row.id, &keys, f.proponent.id).await.unwrap();

    assert_eq!(
        created.request.reference_number.as_deref(),
        Some(format!("PR-{FISCAL_YEAR}-{}-0001", row.id).as_str())
    );
    assert_eq!(created.items.len(), 2);
    assert_eq!(prs.list(None).await.unwrap().len(), 1);

    let laptop = &created.items[0];
    assert_eq!(laptop.key(), ItemKey::new(0, 0));
    assert_eq!(laptop.description, "Laptop");
    assert_eq!(laptop.quantity, Some(5.0));
    assert_eq!(laptop.unit.as_deref(), Some("unit"));
    assert_eq!(laptop.estimated_cost, Some(50000.0));
    let printer = &created.items[1];
    assert_eq!(printer.key(), ItemKey::new(1, 2));
    assert_eq!(printer.description, "Printer");
    assert_eq!(printer.estimated_cost, Some(12000.0));

    let taken = prs.items_in_purchase_requests(row.id).await.unwrap();
    assert!(taken.contains(&ItemKey::new(0, 0)));
    assert!(taken.contains(&ItemKey::new(1, 2)));
    let selectable = prs.selectable_items(row.id).await.unwrap();
    assert_eq!(selectable, [ItemKey::new(1, 0), ItemKey::new(1, 1)]);

    let err = prs
        .create(row.id, &[ItemKey::new(1, 2)], f.proponent.id)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PlannerError::Conflict(ConflictKind::ItemAlreadyInPurchaseRequest { .. })
    ));

    // A referenced row can no longer be removed
    assert!(f.store.delete_row(row.id).await.is_err());
    assert_eq!(f.planner.ppmps().rows(ppmp.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_purchase_request_waits_for_the_app() {
    let f = PlannerFixture::new().await;
    let (_, row) = f.approved().await;
    f.planner.app().approve_row(row.id, f.hope.id).await.unwrap();

    let prs = f.planner.purchase_requests();
    assert!(!prs.can_create(row.id, f.proponent.id).await.unwrap());
    let err = prs
        .create(row.id, &[ItemKey::new(0, 0)], f.proponent.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PlannerError::InvalidTransition { .. }));
    assert!(prs.list(None).await.unwrap().is_empty());
}
