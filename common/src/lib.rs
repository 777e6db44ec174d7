//! Inspection Wizard Common Library
//!
//! CLIと各フロントエンドで共有される型と状態ロジック

pub mod types;
pub mod image;
pub mod error;
pub mod visibility;
pub mod category;
pub mod form;
pub mod summary;
pub mod calculator;
pub mod parser;
pub mod prompts;

pub use types::{
    AnalysisOutput, Dependency, FieldDef, FieldKind, FormData, GridColumn, GridRow, Section, SectionData,
    Suggestion, WizardData, WizardDefinition,
};
pub use image::{ImageRef, is_transient_locator, retain_durable, strip_transient_fields, strip_transient_value};
pub use error::{Error, Result};
pub use visibility::{is_visible, visible_indices};
pub use category::{equipment_label, normalize_equipment_type};
pub use form::{collect_form_data, derive_canonical_fields, merge_grid, SectionPatch};
pub use summary::{
    compute_document_summary, completion_percentage, DocumentSummary, InspectionStatus,
    RecordContext, SummaryInput,
};
pub use calculator::{Calculator, CalculatorCatalog};
pub use parser::{extract_json, parse_analysis_response, parse_field_values};
pub use prompts::{build_analysis_prompt, build_populate_prompt};
