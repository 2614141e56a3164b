// ==========================================
// 导入批次生命周期集成测试
// ==========================================
// 测试目标: 上传 → 预览 → 接受/拒绝 → 回滚 全流程
// ==========================================


use fleet_import::domain::{AuditAction, FieldValue};
use fleet_import::{BatchStatus, ChangeAction, DiffAction, ImportError, ImportType};
use test_helpers::{actor, csv_upload, find_vehicle, seed_vehicle, setup};

const FLEET_CSV: &str = "plate,make,mileage_km\n\
AB123CD,Volvo,120000\n\
NEW001,MAN,5000\n\
,Iveco,300\n";

#[tokio::test]
async fn test_upload_classifies_create_update_error() {
    fleet_import::logging::init_test();
    let ctx = setup();
    seed_vehicle(&ctx, "v-1", "AB123CD", 100_000);

    let batch = ctx
        .service
        .upload(&actor(), csv_upload(ImportType::Fleet, "fleet.csv", FLEET_CSV))
        .await
        .expect("upload failed");

    assert_eq!(batch.status, BatchStatus::Preview);
    assert_eq!(batch.preview.row_count, 3);
    assert_eq!(batch.preview.headers, vec!["plate", "make", "mileage_km"]);
    assert_eq!(batch.file_hash.len(), 64);

    let diff = batch.diff_summary.as_ref().expect("missing diff");
    assert_eq!(diff.total_rows, 3);
    assert_eq!(diff.creates, 1);
    assert_eq!(diff.updates, 1);
    assert_eq!(diff.errors, 1);
    assert_eq!(diff.archives, 0);
    assert_eq!(diff.skips, 0);

    let update = diff
        .records
        .iter()
        .find(|r| r.action == DiffAction::Update)
        .unwrap();
    assert_eq!(update.natural_key.as_deref(), Some("AB123CD"));
    assert_eq!(update.changes.len(), 1);
    assert_eq!(update.changes[0].field, "mileage_km");
    assert_eq!(update.changes[0].before, FieldValue::Int(100_000));
    assert_eq!(update.changes[0].after, FieldValue::Int(120_000));

    let error = diff
        .records
        .iter()
        .find(|r| r.action == DiffAction::Error)
        .unwrap();
    assert_eq!(error.row_number, Some(3));

    // 预览阶段不触碰实体
    let current = find_vehicle(&ctx, "AB123CD").unwrap();
    assert_eq!(current.field("mileage_km"), Some(FieldValue::Int(100_000)));
    assert!(find_vehicle(&ctx, "NEW001").is_none());
}

#[tokio::test]
async fn test_accept_applies_and_records_change_sets() {
    let ctx = setup();
    let seeded = seed_vehicle(&ctx, "v-1", "AB123CD", 100_000);
    let actor = actor();

    let batch = ctx
        .service
        .upload(&actor, csv_upload(ImportType::Fleet, "fleet.csv", FLEET_CSV))
        .await
        .unwrap();

    let outcome = ctx.service.accept(&actor, &batch.batch_id).await.unwrap();
    assert_eq!(outcome.batch.status, BatchStatus::Applied);
    assert_eq!(outcome.batch.decided_by.as_deref(), Some("alice"));
    assert!(outcome.batch.applied_at.is_some());
    assert_eq!(outcome.report.created, 1);
    assert_eq!(outcome.report.updated, 1);
    assert!(outcome.report.failures.is_empty());

    let updated = find_vehicle(&ctx, "AB123CD").unwrap();
    assert_eq!(updated.field("mileage_km"), Some(FieldValue::Int(120_000)));
    let created = find_vehicle(&ctx, "NEW001").unwrap();
    assert_eq!(created.field("make"), Some(FieldValue::Text("MAN".to_string())));

    let change_sets = ctx
        .service
        .list_change_sets(&actor, &batch.batch_id)
        .unwrap();
    assert_eq!(change_sets.len(), 2);

    let update_cs = change_sets
        .iter()
        .find(|cs| cs.action == ChangeAction::Update)
        .unwrap();
    assert_eq!(update_cs.entity_id, "v-1");
    assert_eq!(update_cs.before.as_ref(), Some(&seeded));
    assert_eq!(update_cs.after, updated);

    let create_cs = change_sets
        .iter()
        .find(|cs| cs.action == ChangeAction::Create)
        .unwrap();
    assert!(create_cs.before.is_none());
    assert_eq!(create_cs.entity_id, created.id());
    assert_eq!(create_cs.row_number, Some(2));

    let audit = ctx.audit();
    assert_eq!(audit.count_actions(&batch.batch_id, AuditAction::ImportUpload).unwrap(), 1);
    assert_eq!(audit.count_actions(&batch.batch_id, AuditAction::ImportAccept).unwrap(), 1);
}

#[tokio::test]
async fn test_rollback_restores_exact_state() {
    let ctx = setup();
    let seeded = seed_vehicle(&ctx, "v-1", "AB123CD", 100_000);
    let actor = actor();

    let batch = ctx
        .service
        .upload(&actor, csv_upload(ImportType::Fleet, "fleet.csv", FLEET_CSV))
        .await
        .unwrap();
    ctx.service.accept(&actor, &batch.batch_id).await.unwrap();

    let outcome = ctx.service.rollback(&actor, &batch.batch_id).await.unwrap();
    assert_eq!(outcome.batch.status, BatchStatus::RolledBack);
    assert_eq!(outcome.batch.rolled_back_by.as_deref(), Some("alice"));
    assert!(outcome.batch.rolled_back_at.is_some());
    assert_eq!(outcome.report.deleted, 1);
    assert_eq!(outcome.report.restored, 1);
    assert!(outcome.report.failures.is_empty());

    assert_eq!(find_vehicle(&ctx, "AB123CD"), Some(seeded));
    assert!(find_vehicle(&ctx, "NEW001").is_none());

    // 变更集保留，供审计
    let change_sets = ctx.service.list_change_sets(&actor, &batch.batch_id).unwrap();
    assert_eq!(change_sets.len(), 2);
    assert_eq!(
        ctx.audit()
            .count_actions(&batch.batch_id, AuditAction::ImportRollback)
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_duplicate_upload_rejected_until_declined() {
    let ctx = setup();
    let actor = actor();
    let request = csv_upload(ImportType::Fleet, "fleet.csv", FLEET_CSV);

    let first = ctx.service.upload(&actor, request.clone()).await.unwrap();

    let err = ctx.service.upload(&actor, request.clone()).await.unwrap_err();
    match err {
        ImportError::DuplicateImport {
            existing_batch_id,
            status,
        } => {
            assert_eq!(existing_batch_id, first.batch_id);
            assert_eq!(status, BatchStatus::Preview);
        }
        other => panic!("expected DuplicateImport, got {other:?}"),
    }
    assert_eq!(ctx.service.list_batches(&actor, 10).unwrap().len(), 1);

    let declined = ctx.service.decline(&actor, &first.batch_id).await.unwrap();
    assert_eq!(declined.status, BatchStatus::Declined);
    assert!(declined.declined_at.is_some());

    let second = ctx.service.upload(&actor, request).await.unwrap();
    assert_ne!(second.batch_id, first.batch_id);
    assert_eq!(second.status, BatchStatus::Preview);
}

#[tokio::test]
async fn test_duplicate_upload_allowed_after_rollback() {
    let ctx = setup();
    let actor = actor();
    let request = csv_upload(ImportType::Fleet, "fleet.csv", FLEET_CSV);

    let first = ctx.service.upload(&actor, request.clone()).await.unwrap();
    ctx.service.accept(&actor, &first.batch_id).await.unwrap();

    let err = ctx.service.upload(&actor, request.clone()).await.unwrap_err();
    assert!(matches!(
        err,
        ImportError::DuplicateImport { status: BatchStatus::Applied, .. }
    ));

    ctx.service.rollback(&actor, &first.batch_id).await.unwrap();
    let again = ctx.service.upload(&actor, request).await.unwrap();
    assert_eq!(again.status, BatchStatus::Preview);
}

#[tokio::test]
async fn test_same_file_in_other_workspace_is_independent() {
    let ctx = setup();
    let request = csv_upload(ImportType::Fleet, "fleet.csv", FLEET_CSV);

    let mine = ctx.service.upload(&actor(), request.clone()).await.unwrap();
    let other_actor = test_helpers::actor_in("ws-other");
    let theirs = ctx.service.upload(&other_actor, request).await.unwrap();
    assert_eq!(mine.file_hash, theirs.file_hash);

    // 跨工作区不可见
    let err = ctx.service.get_batch(&other_actor, &mine.batch_id).unwrap_err();
    assert!(matches!(err, ImportError::BatchNotFound(_)));
    let err = ctx.service.accept(&other_actor, &mine.batch_id).await.unwrap_err();
    assert!(matches!(err, ImportError::BatchNotFound(_)));

    let listed = ctx.service.list_batches(&other_actor, 10).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].batch_id, theirs.batch_id);
}

#[tokio::test]
async fn test_full_sync_archives_missing_vehicles() {
    let ctx = setup();
    let actor = actor();
    seed_vehicle(&ctx, "v-1", "AB123CD", 100_000);
    let gone = seed_vehicle(&ctx, "v-2", "ZZ999ZZ", 42_000);

    let batch = ctx
        .service
        .upload(&actor, csv_upload(ImportType::Fleet, "fleet.csv", FLEET_CSV))
        .await
        .unwrap();
    let diff = batch.diff_summary.as_ref().unwrap();
    assert_eq!(diff.archives, 1);
    let archive = diff.records.last().unwrap();
    assert_eq!(archive.action, DiffAction::Archive);
    assert_eq!(archive.natural_key.as_deref(), Some("ZZ999ZZ"));
    assert!(archive.row_number.is_none());

    let outcome = ctx.service.accept(&actor, &batch.batch_id).await.unwrap();
    assert_eq!(outcome.report.archived, 1);
    assert!(find_vehicle(&ctx, "ZZ999ZZ").unwrap().is_archived());

    ctx.service.rollback(&actor, &batch.batch_id).await.unwrap();
    assert_eq!(find_vehicle(&ctx, "ZZ999ZZ"), Some(gone));
}

#[tokio::test]
async fn test_full_sync_archives_every_vehicle_sharing_a_missing_plate() {
    let ctx = setup();
    let actor = actor();
    // 历史数据：同一规范化车牌的两种写法
    seed_vehicle(&ctx, "v-1", "AB 1", 10);
    seed_vehicle(&ctx, "v-2", "ab1", 20);

    let batch = ctx
        .service
        .upload(&actor, csv_upload(ImportType::Fleet, "fleet.csv", "plate\nZZ9\n"))
        .await
        .unwrap();
    let diff = batch.diff_summary.as_ref().unwrap();
    assert_eq!(diff.creates, 1);
    assert_eq!(diff.archives, 2);

    let outcome = ctx.service.accept(&actor, &batch.batch_id).await.unwrap();
    assert_eq!(outcome.report.archived, 2);
    assert!(find_vehicle(&ctx, "AB 1").unwrap().is_archived());
    assert!(find_vehicle(&ctx, "ab1").unwrap().is_archived());
}
