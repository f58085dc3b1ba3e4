/// Page name constants to ensure consistency across the codebase
/// These identify the built-in cleaning pages and their embedded presets

// Built-in page identifiers (used in CLI and registry)
pub const DGM_QAQC_PAGE: &str = "dgm_qaqc";
pub const ES_QAQC_PAGE: &str = "es_qaqc";
pub const MB_AUTO_PAGE: &str = "mb_auto";
pub const DGM_AUTO_PAGE: &str = "dgm_auto";
pub const MB_QAQC_PAGE: &str = "mb_qaqc";
pub const MB_FRAG_PAGE: &str = "mb_frag";
pub const DGM_FRAG_PAGE: &str = "dgm_frag";
pub const ES_FRAG_PAGE: &str = "es_frag";
pub const ES_AUTO_PAGE: &str = "es_auto";

// Embedded preset sources
pub const DGM_QAQC_PRESET: &str = include_str!("../pages/dgm_qaqc.toml");
pub const ES_QAQC_PRESET: &str = include_str!("../pages/es_qaqc.toml");
pub const MB_AUTO_PRESET: &str = include_str!("../pages/mb_auto.toml");
pub const DGM_AUTO_PRESET: &str = include_str!("../pages/dgm_auto.toml");
pub const MB_QAQC_PRESET: &str = include_str!("../pages/mb_qaqc.toml");
pub const MB_FRAG_PRESET: &str = include_str!("../pages/mb_frag.toml");
pub const DGM_FRAG_PRESET: &str = include_str!("../pages/dgm_frag.toml");
pub const ES_FRAG_PRESET: &str = include_str!("../pages/es_frag.toml");
pub const ES_AUTO_PRESET: &str = include_str!("../pages/es_auto.toml");

/// Environment variable naming a directory of extra page files
pub const PAGES_DIR_ENV: &str = "XENERGY_PAGES_DIR";

// Matching
pub const DEFAULT_MATCH_THRESHOLD: f64 = 0.8;
/// Weight of token coverage when blended with string similarity
pub const TOKEN_COVERAGE_WEIGHT: f64 = 0.7;
/// New names this similar to an earlier new name share its code
pub const NEW_CODE_DUPLICATE_SIMILARITY: f64 = 0.95;

// Export
pub const DEFAULT_SHEET_NAME: &str = "Cleaned";
pub const DEFAULT_FILE_BASE: &str = "cleaned";
pub const DEFAULT_VOCABULARY_FILE_BASE: &str = "vocabulary_updated";

// Derived validation columns
pub const VALIDATION_STATUS_COLUMN: &str = "validation_status";
pub const VALIDATION_ISSUES_COLUMN: &str = "validation_issues";

/// Get all built-in page identifiers with their preset sources
pub fn get_builtin_pages() -> Vec<(&'static str, &'static str)> {
    vec![
        (DGM_QAQC_PAGE, DGM_QAQC_PRESET),
        (ES_QAQC_PAGE, ES_QAQC_PRESET),
        (MB_AUTO_PAGE, MB_AUTO_PRESET),
        (DGM_AUTO_PAGE, DGM_AUTO_PRESET),
        (MB_QAQC_PAGE, MB_QAQC_PRESET),
        (MB_FRAG_PAGE, MB_FRAG_PRESET),
        (DGM_FRAG_PAGE, DGM_FRAG_PRESET),
        (ES_FRAG_PAGE, ES_FRAG_PRESET),
        (ES_AUTO_PAGE, ES_AUTO_PRESET),
    ]
}

/// Convert a user-typed page name (`DGM_QAQC`, `dgm-qaqc`) to its identifier
pub fn page_name_to_id(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('-', "_")
}
