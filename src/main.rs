use anyhow::Context;
use base64::Engine;
use clap::Parser;
use inspection_wizard::analysis::{analyze_current_section, CancellationFlag};
use inspection_wizard::cli::{field_value, Cli, Commands};
use inspection_wizard::config::Config;
use inspection_wizard::controller::{CompletionOutcome, WizardController, WizardEvent, WizardStage};
use inspection_wizard::error::WizardError;
use inspection_wizard::llm::{client_from_config, LlmClient};
use inspection_wizard::populate::PopulateWorker;
use inspection_wizard::report;
use inspection_wizard::session::SessionFile;
use inspection_wizard::store::{
    ContentStore, FileContentStore, FileRecordStore, HttpStore, RecordStore,
};
use inspection_wizard::logging;
use inspection_wizard_common::{
    CalculatorCatalog, FormData, SectionPatch, WizardDefinition,
};
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = Config::load().context("設定の読み込みに失敗")?;
    if let Some(provider) = cli.ai_provider {
        config.ai_provider = provider;
    }

    // ウィザード定義が不要なコマンド
    match &cli.command {
        Commands::Config { set_api_key, set_backend_url, show } => {
            let mut config = config;

            if let Some(key) = set_api_key {
                config.set_api_key(key.clone())?;
                println!("✔ APIキーを設定しました");
            }
            if let Some(url) = set_backend_url {
                config.backend_url = Some(url.clone()).filter(|u| !u.trim().is_empty());
                config.save()?;
                println!("✔ 記録APIのURLを設定しました");
            }

            if *show || (set_api_key.is_none() && set_backend_url.is_none()) {
                println!("設定:");
                println!("  モデル: {}", config.model);
                println!("  AIプロバイダ: {}", config.ai_provider.command_name());
                println!("  LLM API: {}", config.llm_base_url);
                println!(
                    "  記録API: {}",
                    config.backend_url.as_deref().unwrap_or("（ローカル保存）")
                );
                println!("  データフォルダ: {}", config.data_dir()?.display());
                println!("  連続送信の無視間隔: {}ms", config.debounce_ms);
                println!("  APIキー: {}", if config.get_api_key().is_ok() { "設定済み" } else { "未設定" });
            }
            return Ok(());
        }
        Commands::Calculators { dir } => {
            let catalog = CalculatorCatalog::load_dir(dir)
                .with_context(|| format!("計算機を読み込めません: {}", dir.display()))?;
            println!("計算機: {}件", catalog.len());
            for calculator in catalog.iter() {
                println!(
                    "  {} - {}（入力 {}項目）",
                    calculator.id,
                    calculator.name,
                    calculator.ui_definition.len()
                );
            }
            return Ok(());
        }
        _ => {}
    }

    let definition = WizardDefinition::from_file(&cli.wizard)
        .with_context(|| format!("ウィザード定義を読めません: {}", cli.wizard.display()))?;
    let session_path = cli
        .session
        .clone()
        .unwrap_or_else(|| SessionFile::default_path(Path::new(".")));

    if let Commands::Session { clear } = &cli.command {
        if *clear {
            match SessionFile::clear(&session_path)? {
                true => println!("✔ セッションを削除しました: {}", session_path.display()),
                false => println!("セッションファイルが存在しません"),
            }
        } else {
            let session = SessionFile::load(&session_path, &definition.id);
            println!("セッション情報:");
            println!("  パス: {}", session_path.display());
            println!("  ウィザード: {}", session.wizard_id);
            println!("  記録ID: {}", session.data.record_id.as_deref().unwrap_or("（未保存）"));
            println!("  完了済み: {:?}", session.data.completed_steps);
        }
        return Ok(());
    }

    let mut session = SessionFile::load(&session_path, &definition.id);
    let controller = Arc::new(build_controller(&config, definition, &session)?);

    match cli.command {
        Commands::Steps => print_steps(&controller),

        Commands::Input { values } => {
            let before = controller.snapshot();
            let after = controller.submit_input(to_form(values));
            if Arc::ptr_eq(&before, &after) {
                println!("変更はありません");
            } else {
                println!("✔ 初期入力を記録しました");
            }
        }

        Commands::Fill { section, values, transcript, notes } => {
            let index = target_section(&controller, section)?;
            let before = controller.snapshot();
            let after = controller.update_section(
                index,
                SectionPatch {
                    fields: to_form(values),
                    transcript,
                    notes,
                    ..Default::default()
                },
            );
            if Arc::ptr_eq(&before, &after) {
                println!("変更はありません");
            } else {
                println!("✔ セクション{}を更新しました", index);
            }
        }

        Commands::Image { path, section } => {
            let index = target_section(&controller, section)?;
            let bytes = std::fs::read(&path)
                .map_err(|_| WizardError::FileNotFound(path.display().to_string()))?;
            let data_url = format!(
                "data:{};base64,{}",
                mime_for(&path),
                base64::engine::general_purpose::STANDARD.encode(bytes)
            );
            let image = controller.capture_image(index, &data_url).await?;
            if image.is_durable() {
                println!("✔ 画像を保存しました: {}", image.locator());
            } else {
                println!("⚠ 画像を保存できませんでした（記録には含まれません）");
            }
        }

        Commands::Complete { no_populate, calculators } => {
            let events = controller.take_events();
            match controller.complete_current_step().await? {
                CompletionOutcome::Advanced { completed_index, next, summary } => {
                    println!("✔ セクション{}を保存しました", completed_index);
                    println!("  進捗: {}%（{}）", summary.progress, summary.status);
                    match next {
                        WizardStage::Section(index) => println!("  次: {}", section_title(&controller, index)),
                        WizardStage::Export => println!("  全セクション完了、`report` で出力できます"),
                        WizardStage::Input => {}
                    }
                }
                CompletionOutcome::Ignored(reason) => println!("スキップ: {}", reason),
            }

            if let Some(mut events) = events {
                let mut requests = Vec::new();
                while let Ok(event) = events.try_recv() {
                    match event {
                        WizardEvent::WizardCompleted { record_id } => println!(
                            "✅ 点検記録が完了しました（{}）",
                            record_id.as_deref().unwrap_or("-")
                        ),
                        request @ WizardEvent::PopulateRequested { .. } => requests.push(request),
                        WizardEvent::StepCompleted { .. } => {}
                    }
                }
                if !no_populate && !requests.is_empty() {
                    run_populate(&config, &controller, &calculators, requests).await;
                }
            }
        }

        Commands::Back => {
            controller.back();
            match controller.stage() {
                WizardStage::Section(index) => println!("現在: {}", section_title(&controller, index)),
                WizardStage::Input => println!("現在: 初期入力"),
                WizardStage::Export => println!("現在: 出力"),
            }
        }

        Commands::Open { record_id } => {
            let data = controller.open_record(&record_id).await?;
            println!("✔ 記録を開きました: {}", record_id);
            println!("  進捗: {}%（{}）", data.summary.progress, data.summary.status);
        }

        Commands::Analyze => {
            let llm = client_from_config(&config)?;
            let cancel = CancellationFlag::new();
            let flag = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    flag.cancel();
                }
            });

            println!("AI解析中...");
            let output =
                analyze_current_section(&controller, llm.as_ref(), &config.model, &cancel).await?;
            println!("\n{}", output.report);
            if !output.suggestions.is_empty() {
                println!("\n提案:");
                for suggestion in &output.suggestions {
                    match &suggestion.field {
                        Some(field) => println!("  - {}: {}", field, suggestion.text),
                        None => println!("  - {}", suggestion.text),
                    }
                }
            }
        }

        Commands::Summary { json } => {
            let data = controller.snapshot();
            if json {
                println!("{}", serde_json::to_string_pretty(&data.summary)?);
            } else {
                let summary = &data.summary;
                println!("機器種別: {}（{}）", summary.equipment_label, summary.equipment_type);
                println!("機器番号: {}", summary.equipment_id);
                println!("所有者: {}", summary.owner);
                println!("点検日: {}", summary.inspection_date);
                println!("進捗: {}%（{}）", summary.progress, summary.status);
            }
        }

        Commands::Report { output } => {
            let data = controller.snapshot();
            match output {
                Some(path) => {
                    report::write_report(controller.definition(), &data, &path)?;
                    println!("✔ レポートを出力: {}", path.display());
                }
                None => print!("{}", report::render_report(controller.definition(), &data)),
            }
        }

        Commands::Config { .. } | Commands::Calculators { .. } | Commands::Session { .. } => {}
    }

    session.data = (*controller.snapshot()).clone();
    session.context = controller.record_context();
    session
        .save(&session_path)
        .with_context(|| format!("セッションを保存できません: {}", session_path.display()))?;

    Ok(())
}

fn build_controller(
    config: &Config,
    definition: WizardDefinition,
    session: &SessionFile,
) -> anyhow::Result<WizardController> {
    let (store, content): (Arc<dyn RecordStore>, Arc<dyn ContentStore>) = match &config.backend_url {
        Some(url) => {
            let http = Arc::new(HttpStore::new(url, config.timeout())?);
            (http.clone() as Arc<dyn RecordStore>, http as Arc<dyn ContentStore>)
        }
        None => {
            let dir = config.data_dir()?;
            (
                Arc::new(FileRecordStore::new(dir.clone())) as Arc<dyn RecordStore>,
                Arc::new(FileContentStore::new(dir)) as Arc<dyn ContentStore>,
            )
        }
    };

    Ok(WizardController::with_debounce(definition, store, config.debounce())
        .with_content_store(content)
        .with_data(session.data.clone(), session.context.clone()))
}

/// 自動入力要求を順に処理（失敗はログのみ）
async fn run_populate(
    config: &Config,
    controller: &Arc<WizardController>,
    calculators: &Path,
    requests: Vec<WizardEvent>,
) {
    let catalog = match CalculatorCatalog::load_dir(calculators) {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            warn!("計算機を読み込めないため自動入力をスキップ: {}", e);
            return;
        }
    };
    let llm: Arc<dyn LlmClient> = match client_from_config(config) {
        Ok(client) => Arc::from(client),
        Err(e) => {
            warn!("LLMを利用できないため自動入力をスキップ: {}", e);
            return;
        }
    };

    let worker = PopulateWorker::new(controller.clone(), llm, catalog, config.model.clone());
    println!("次ステップを自動入力中...");
    for event in requests {
        worker.handle(event).await;
    }
}

fn print_steps(controller: &WizardController) {
    let data = controller.snapshot();
    let visible = controller.visible_sections();
    let stage = controller.stage();

    println!("{}", controller.definition().title);
    if controller.definition().input_step {
        let marker = if stage == WizardStage::Input { "▶" } else { " " };
        let done = if data.input_captured { "✔" } else { " " };
        println!("{} [{}] 初期入力", marker, done);
    }
    for (index, section) in controller.sections().iter().enumerate() {
        let marker = if stage == WizardStage::Section(index) { "▶" } else { " " };
        let done = if data.is_completed(index) { "✔" } else { " " };
        let hidden = if visible.contains(&index) { "" } else { "（非表示）" };
        println!("{} [{}] {}: {}{}", marker, done, index, section.title, hidden);
    }
    println!("進捗: {}%（{}）", data.summary.progress, data.summary.status);
}

fn target_section(controller: &WizardController, section: Option<usize>) -> anyhow::Result<usize> {
    match section {
        Some(index) if index < controller.sections().len() => Ok(index),
        Some(index) => Err(inspection_wizard_common::Error::UnknownSection(index).into()),
        None => Ok(controller.current_section().ok_or(WizardError::NoSections)?),
    }
}

fn section_title(controller: &WizardController, index: usize) -> String {
    controller
        .sections()
        .get(index)
        .map(|s| s.title.clone())
        .unwrap_or_else(|| format!("セクション{}", index))
}

fn to_form(values: Vec<(String, String)>) -> FormData {
    values
        .into_iter()
        .map(|(key, raw)| (key, field_value(&raw)))
        .collect()
}

fn mime_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "image/jpeg",
    }
}
