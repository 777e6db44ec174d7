//! ウィザード状態管理のテスト
//!
//! ステップ進行・保存失敗時の挙動・連打防止・進捗・画像参照の扱いを検証

mod common;

use common::{section, three_sections, MockContentStore, MockRecordStore};
use inspection_wizard::controller::{
    CompletionOutcome, IgnoreReason, WizardController, WizardEvent, WizardStage,
};
use inspection_wizard::error::WizardError;
use inspection_wizard::store::NormalizedSection;
use inspection_wizard_common::{
    Dependency, ImageRef, InspectionStatus, SectionData, SectionPatch, WizardDefinition,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn controller(definition: WizardDefinition, store: Arc<MockRecordStore>) -> WizardController {
    WizardController::with_debounce(definition, store, Duration::ZERO)
}

fn progress_of(outcome: &CompletionOutcome) -> u8 {
    match outcome {
        CompletionOutcome::Advanced { summary, .. } => summary.progress,
        CompletionOutcome::Ignored(reason) => panic!("完了処理が無視された: {}", reason),
    }
}

/// 内容が同じパッチでは状態が差し替わらない
#[test]
fn test_identical_patch_keeps_same_state() {
    let store = Arc::new(MockRecordStore::new());
    let wizard = controller(three_sections(), store);

    let first = wizard.update_section(0, SectionPatch::field("owner", "ACME"));
    let second = wizard.update_section(0, SectionPatch::field("owner", "ACME"));
    assert!(Arc::ptr_eq(&first, &second));

    let images = vec![ImageRef::durable("f1", "https://files.local/f1.jpg")];
    let with_images = wizard.update_section(
        0,
        SectionPatch {
            images: Some(images.clone()),
            ..Default::default()
        },
    );
    assert!(!Arc::ptr_eq(&second, &with_images));

    let again = wizard.update_section(
        0,
        SectionPatch {
            images: Some(images),
            ..Default::default()
        },
    );
    assert!(Arc::ptr_eq(&with_images, &again));
}

/// 範囲外のインデックスはプレースホルダーで配列を伸ばす
#[test]
fn test_update_section_grows_with_placeholders() {
    let store = Arc::new(MockRecordStore::new());
    let wizard = controller(three_sections(), store);

    let state = wizard.update_section(2, SectionPatch::field("tmin", 8.2));
    assert_eq!(state.sections.len(), 3);
    assert_eq!(state.sections[1].section_id, "visual");
    assert!(state.sections[1].fields.is_empty());
    assert_eq!(state.sections[2].fields["tmin"], json!(8.2));
}

/// 音声書き起こしの反映（同じ内容なら差し替えない）
#[test]
fn test_set_transcript() {
    let store = Arc::new(MockRecordStore::new());
    let wizard = controller(three_sections(), store);

    let first = wizard.set_transcript(1, "nozzle N2 shows pitting");
    assert_eq!(first.sections[1].transcript, "nozzle N2 shows pitting");

    let again = wizard.set_transcript(1, "nozzle N2 shows pitting");
    assert!(Arc::ptr_eq(&first, &again));
}

/// 保存に失敗したらステップを進めない
#[tokio::test]
async fn test_failed_save_does_not_advance() {
    let store = Arc::new(MockRecordStore::failing());
    let wizard = controller(three_sections(), store.clone());
    wizard.update_section(0, SectionPatch::field("owner", "ACME"));

    let result = wizard.complete_current_step().await;
    assert!(matches!(result, Err(WizardError::Persistence(_))));
    assert_eq!(store.calls(), 1);

    let state = wizard.snapshot();
    assert_eq!(wizard.stage(), WizardStage::Section(0));
    assert!(state.completed_steps.is_empty());
    assert_eq!(state.summary.progress, 0);
    assert!(state.record_id.is_none());
}

/// 失敗後は実行中フラグが解放され、再試行できる
#[tokio::test]
async fn test_retry_after_failure() {
    let store = Arc::new(MockRecordStore::failing());
    let wizard = controller(three_sections(), store.clone());

    assert!(wizard.complete_current_step().await.is_err());
    store.fail.store(false, std::sync::atomic::Ordering::SeqCst);

    let outcome = wizard.complete_current_step().await.unwrap();
    assert_eq!(progress_of(&outcome), 33);
    assert_eq!(store.calls(), 2);
}

/// 同時に2回呼んでも保存は1回
#[tokio::test]
async fn test_concurrent_completion_saves_once() {
    let store = Arc::new(MockRecordStore::with_delay(Duration::from_millis(50)));
    let wizard = controller(three_sections(), store.clone());

    let (a, b) = tokio::join!(wizard.complete_current_step(), wizard.complete_current_step());
    let outcomes = [a.unwrap(), b.unwrap()];

    assert_eq!(store.calls(), 1);
    let advanced = outcomes
        .iter()
        .filter(|o| matches!(o, CompletionOutcome::Advanced { .. }))
        .count();
    assert_eq!(advanced, 1);
    assert!(outcomes
        .iter()
        .any(|o| *o == CompletionOutcome::Ignored(IgnoreReason::InFlight)));
    assert_eq!(wizard.snapshot().completed_steps, vec![0]);
}

/// 最小間隔内の連続呼び出しは無視される
#[tokio::test]
async fn test_rapid_sequential_completion_is_debounced() {
    let store = Arc::new(MockRecordStore::new());
    let wizard = WizardController::with_debounce(three_sections(), store.clone(), Duration::from_secs(10));

    let first = wizard.complete_current_step().await.unwrap();
    let second = wizard.complete_current_step().await.unwrap();

    assert!(matches!(first, CompletionOutcome::Advanced { completed_index: 0, .. }));
    assert_eq!(second, CompletionOutcome::Ignored(IgnoreReason::Debounced));
    assert_eq!(store.calls(), 1);
    assert_eq!(wizard.stage(), WizardStage::Section(1));
}

/// 3セクション: 0,1 完了で67%、2 完了で100%・completed
#[tokio::test]
async fn test_three_section_progress() {
    let store = Arc::new(MockRecordStore::new());
    let wizard = controller(three_sections(), store.clone());

    wizard.complete_current_step().await.unwrap();
    let outcome = wizard.complete_current_step().await.unwrap();

    let state = wizard.snapshot();
    assert_eq!(state.completed_steps, vec![0, 1]);
    assert_eq!(progress_of(&outcome), 67);
    assert_eq!(state.summary.status, InspectionStatus::InProgress);
    assert_eq!(wizard.stage(), WizardStage::Section(2));

    let outcome = wizard.complete_current_step().await.unwrap();
    let state = wizard.snapshot();
    assert_eq!(progress_of(&outcome), 100);
    assert_eq!(state.summary.status, InspectionStatus::Completed);
    assert_eq!(state.completed_steps, vec![0, 1, 2]);
    assert_eq!(wizard.stage(), WizardStage::Export);
    assert_eq!(store.calls(), 3);
}

/// 進捗は単調増加、完了イベントは1回だけ
#[tokio::test]
async fn test_progress_monotonic_and_single_completion_event() {
    let store = Arc::new(MockRecordStore::new());
    let wizard = controller(three_sections(), store);
    let mut events = wizard.take_events().unwrap();

    let mut progress = Vec::new();
    for _ in 0..3 {
        let outcome = wizard.complete_current_step().await.unwrap();
        progress.push(progress_of(&outcome));
    }
    assert_eq!(progress, vec![33, 67, 100]);
    assert!(progress.windows(2).all(|w| w[0] <= w[1]));

    // 出力ステップでは何もしない
    let outcome = wizard.complete_current_step().await.unwrap();
    assert_eq!(outcome, CompletionOutcome::Ignored(IgnoreReason::NothingToComplete));

    let mut step_events = 0;
    let mut completed_events = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            WizardEvent::StepCompleted { .. } => step_events += 1,
            WizardEvent::WizardCompleted { record_id } => {
                completed_events += 1;
                assert_eq!(record_id.as_deref(), Some("rec-1"));
            }
            WizardEvent::PopulateRequested { .. } => {}
        }
    }
    assert_eq!(step_events, 3);
    assert_eq!(completed_events, 1);
}

/// 保存内容に一時画像を含めない
#[tokio::test]
async fn test_payload_contains_no_transient_images() {
    let store = Arc::new(MockRecordStore::new());
    let content = Arc::new(MockContentStore {
        fail_upload: true,
        ..Default::default()
    });
    let wizard = controller(three_sections(), store.clone()).with_content_store(content);

    // アップロード失敗 → 一時バッファのみ
    let captured = wizard
        .capture_image(0, "data:image/jpeg;base64,/9j/4AAQ")
        .await
        .unwrap();
    assert!(!captured.is_durable());
    assert_eq!(wizard.snapshot().image_buffer.len(), 1);

    wizard.update_section(
        0,
        SectionPatch {
            images: Some(vec![
                ImageRef::from_locator("blob:https://app.local/123", None),
                ImageRef::durable("f1", "https://files.local/f1.jpg"),
                ImageRef::durable("f1", "https://files.local/f1.jpg"),
            ]),
            ..Default::default()
        },
    );

    wizard.complete_current_step().await.unwrap();
    let request = store.last_request().unwrap();
    assert_eq!(
        request.payload.images,
        vec![ImageRef::durable("f1", "https://files.local/f1.jpg")]
    );
    let json = serde_json::to_string(&request).unwrap();
    assert!(!json.contains("data:"));
    assert!(!json.contains("blob:"));
}

/// フィールドに入ったローカル画像も保存内容に含めない
#[tokio::test]
async fn test_payload_strips_data_urls_in_fields() {
    let store = Arc::new(MockRecordStore::new());
    let wizard = controller(three_sections(), store.clone());

    wizard.update_section(
        0,
        SectionPatch::field(
            "photos",
            json!(["data:image/jpeg;base64,/9j/4AAQ", "https://files/a.jpg"]),
        ),
    );
    wizard.update_section(
        0,
        SectionPatch::field("cover", json!({"id": "c1", "url": "blob:https://app.local/9"})),
    );
    wizard.submit_input(
        json!({"sketch": "data:image/png;base64,AA", "site": "Plant A"})
            .as_object()
            .cloned()
            .unwrap(),
    );

    wizard.complete_current_step().await.unwrap();
    let request = store.last_request().unwrap();
    assert_eq!(request.payload.fields["photos"], json!(["https://files/a.jpg"]));
    assert!(request.payload.fields.get("cover").is_none());
    assert!(request.snapshot.form_data.get("sketch").is_none());
    assert_eq!(request.snapshot.input_data["site"], json!("Plant A"));

    let json = serde_json::to_string(&request).unwrap();
    assert!(!json.contains("data:"));
    assert!(!json.contains("blob:"));

    // 画面上の状態はそのまま
    assert_eq!(
        wizard.snapshot().sections[0].fields["photos"][0],
        json!("data:image/jpeg;base64,/9j/4AAQ")
    );
}

/// 保存先が返した範囲外のセクションは反映しない
#[tokio::test]
async fn test_out_of_range_normalized_section_is_ignored() {
    let store = Arc::new(MockRecordStore {
        normalized_sections: vec![
            NormalizedSection {
                index: 1_000_000,
                data: SectionData::default(),
            },
            NormalizedSection {
                index: 0,
                data: SectionData {
                    section_id: "general".into(),
                    fields: json!({"owner": "ACME Corp"}).as_object().cloned().unwrap(),
                    ..Default::default()
                },
            },
        ],
        ..Default::default()
    });
    let wizard = controller(three_sections(), store);
    wizard.update_section(0, SectionPatch::field("owner", "acme"));

    let outcome = wizard.complete_current_step().await.unwrap();
    assert_eq!(progress_of(&outcome), 33);
    let state = wizard.snapshot();
    assert!(state.sections.len() <= 3);
    assert_eq!(state.sections[0].fields["owner"], json!("ACME Corp"));
}

/// 音声・メモの一時バッファは確定でセクションへ移る
#[test]
fn test_buffers_commit_to_section() {
    let store = Arc::new(MockRecordStore::new());
    let wizard = controller(three_sections(), store);

    wizard.buffer_voice("shell plate");
    wizard.buffer_voice("  light pitting near nozzle N2 ");
    wizard.buffer_text("recheck after cleaning");
    let buffered = wizard.snapshot();
    assert_eq!(buffered.voice_buffer, "shell plate light pitting near nozzle N2");
    assert_eq!(buffered.text_buffer, "recheck after cleaning");
    assert!(buffered.sections.is_empty());

    let same = wizard.buffer_voice("   ");
    assert!(Arc::ptr_eq(&buffered, &same));

    let committed = wizard.commit_buffers(1);
    assert_eq!(committed.sections[1].transcript, "shell plate light pitting near nozzle N2");
    assert_eq!(committed.sections[1].notes, "recheck after cleaning");
    assert!(committed.voice_buffer.is_empty());
    assert!(committed.text_buffer.is_empty());

    wizard.buffer_voice("second pass");
    let appended = wizard.commit_buffers(1);
    assert_eq!(
        appended.sections[1].transcript,
        "shell plate light pitting near nozzle N2\nsecond pass"
    );

    // 空のバッファでは状態を差し替えない
    let unchanged = wizard.commit_buffers(1);
    assert!(Arc::ptr_eq(&appended, &unchanged));
}

/// アップロード成功でDurable参照がセクションに入る
#[tokio::test]
async fn test_capture_image_appends_durable_reference() {
    let store = Arc::new(MockRecordStore::new());
    let content = Arc::new(MockContentStore::default());
    let wizard = controller(three_sections(), store).with_content_store(content);

    let image = wizard
        .capture_image(1, "data:image/jpeg;base64,/9j/4AAQ")
        .await
        .unwrap();
    assert!(image.is_durable());

    let state = wizard.snapshot();
    assert_eq!(state.sections[1].images, vec![image]);
    assert!(state.image_buffer.is_empty());
}

/// 保存先の応答（記録ID・グリッド行）を反映する
#[tokio::test]
async fn test_applies_record_id_and_grid_rows() {
    let store = Arc::new(MockRecordStore {
        grid_data: vec![
            json!({"id": "r1", "reading": 9.8, "status": "ok"}).as_object().cloned().unwrap(),
            json!({"id": "r2", "reading": 7.1}).as_object().cloned().unwrap(),
        ],
        ..Default::default()
    });
    let wizard = controller(three_sections(), store.clone());
    wizard.update_section(
        0,
        SectionPatch {
            grid: Some(vec![json!({"id": "r1", "reading": 9.8}).as_object().cloned().unwrap()]),
            ..Default::default()
        },
    );

    wizard.complete_current_step().await.unwrap();
    let state = wizard.snapshot();
    assert_eq!(state.record_id.as_deref(), Some("rec-1"));
    assert_eq!(state.sections[0].grid.len(), 2);
    assert_eq!(state.sections[0].grid[0]["status"], json!("ok"));

    // 次の保存は同じ記録IDで行う
    wizard.complete_current_step().await.unwrap();
    assert_eq!(store.last_request().unwrap().record_id.as_deref(), Some("rec-1"));
}

/// サマリーは入力から正規化した設備種別を使う
#[tokio::test]
async fn test_summary_uses_canonical_equipment_type() {
    let store = Arc::new(MockRecordStore::new());
    let wizard = controller(three_sections(), store.clone());
    wizard.update_section(
        0,
        SectionPatch::fields(
            json!({"equipmentType": "Pressure Vessel", "equipmentId": "V-101", "owner": "ACME"})
                .as_object()
                .cloned()
                .unwrap(),
        ),
    );

    wizard.complete_current_step().await.unwrap();
    let summary = wizard.snapshot().summary.clone();
    assert_eq!(summary.equipment_type, "pressure_vessel");
    assert_eq!(summary.equipment_id, "V-101");
    assert_eq!(summary.owner, "ACME");

    let request = store.last_request().unwrap();
    assert_eq!(request.payload.canonical["equipmentType"], json!("pressure_vessel"));
    assert_eq!(request.snapshot.current_step, 1);
    assert_eq!(request.snapshot.completed_steps, vec![0]);
}

fn conditional_definition() -> WizardDefinition {
    let mut ut = section("ut", &["tmin"]);
    ut.depends_on = Some(Dependency {
        field: "method".into(),
        values: vec![json!("UT")],
        negate: false,
    });
    ut.prompt_ref = Some("ut-thickness".into());
    WizardDefinition {
        id: "vessel".into(),
        title: "Pressure Vessel".into(),
        input_step: false,
        sections: vec![section("general", &["method"]), ut, section("findings", &["result"])],
    }
}

/// 表示判定はフォームデータから毎回再計算する
#[tokio::test]
async fn test_hidden_section_is_skipped_and_refiltered() {
    let store = Arc::new(MockRecordStore::new());
    let wizard = controller(conditional_definition(), store);
    assert_eq!(wizard.visible_sections(), vec![0, 2]);

    match wizard.complete_current_step().await.unwrap() {
        CompletionOutcome::Advanced { next, summary, .. } => {
            assert_eq!(next, WizardStage::Section(2));
            assert_eq!(summary.progress, 50);
        }
        other => panic!("次へ進むべき: {:?}", other),
    }

    wizard.update_section(0, SectionPatch::field("method", "UT"));
    assert_eq!(wizard.visible_sections(), vec![0, 1, 2]);
    assert_eq!(wizard.stage(), WizardStage::Section(2));

    wizard.back();
    assert_eq!(wizard.stage(), WizardStage::Section(1));
    wizard.back();
    assert_eq!(wizard.stage(), WizardStage::Section(0));
    wizard.back();
    assert_eq!(wizard.stage(), WizardStage::Section(0));
}

/// 次のセクションに計算機があり解析結果があれば自動入力を要求する
#[tokio::test]
async fn test_populate_requested_for_next_section() {
    let store = Arc::new(MockRecordStore::new());
    let wizard = controller(conditional_definition(), store);
    let mut events = wizard.take_events().unwrap();

    wizard.update_section(0, SectionPatch::field("method", "UT"));
    wizard.set_analysis(inspection_wizard_common::AnalysisOutput {
        report: "General corrosion on shell course 2".into(),
        ..Default::default()
    });
    wizard.complete_current_step().await.unwrap();

    let received: Vec<WizardEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(received.contains(&WizardEvent::PopulateRequested {
        section_index: 1,
        prompt_ref: "ut-thickness".into(),
    }));
}

/// 解析結果がなければ自動入力は要求しない
#[tokio::test]
async fn test_no_populate_without_analysis() {
    let store = Arc::new(MockRecordStore::new());
    let wizard = controller(conditional_definition(), store);
    let mut events = wizard.take_events().unwrap();

    wizard.update_section(0, SectionPatch::field("method", "UT"));
    wizard.complete_current_step().await.unwrap();

    let received: Vec<WizardEvent> = std::iter::from_fn(|| events.try_recv().ok()).collect();
    assert!(!received
        .iter()
        .any(|e| matches!(e, WizardEvent::PopulateRequested { .. })));
}

/// 初期入力ステップが未完了なら完了処理しない
#[tokio::test]
async fn test_input_step_must_be_captured_first() {
    let store = Arc::new(MockRecordStore::new());
    let mut definition = three_sections();
    definition.input_step = true;
    let wizard = controller(definition, store.clone());

    assert_eq!(wizard.stage(), WizardStage::Input);
    let outcome = wizard.complete_current_step().await.unwrap();
    assert_eq!(outcome, CompletionOutcome::Ignored(IgnoreReason::InputPending));
    assert_eq!(store.calls(), 0);

    wizard.submit_input(json!({"owner": "ACME"}).as_object().cloned().unwrap());
    assert_eq!(wizard.stage(), WizardStage::Section(0));
    assert_eq!(wizard.form_data()["owner"], json!("ACME"));

    wizard.complete_current_step().await.unwrap();
    assert_eq!(store.calls(), 1);
}
