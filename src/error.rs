//! Error types for the export robot.
//!
//! Every fatal condition in the pipeline has its own variant. Messages are
//! written for operators and are returned verbatim in HTTP error bodies.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, RoboError>;

#[derive(Debug, Error)]
pub enum RoboError {
    #[error("Relatório desconhecido: {0}")]
    UnknownReport(String),

    #[error("Credenciais do portal não configuradas (defina ZG_USER e ZG_PASS).")]
    MissingCredentials,

    #[error("Elemento '{selector}' não apareceu em {}ms.", .timeout.as_millis())]
    SelectorTimeout { selector: String, timeout: Duration },

    #[error("Navegação não concluída em {}ms: {target}", .timeout.as_millis())]
    NavigationTimeout { target: String, timeout: Duration },

    #[error("Elemento não clicável: {0}")]
    NotClickable(String),

    #[error("Não consegui abrir 'Painéis e relatórios' (verifique viewport/headless).")]
    ReportsMenuUnavailable,

    #[error("Frame de relatórios não foi encontrado após {0} tentativas.")]
    ReportsFrameMissing(u32),

    #[error("Exports box não visível para clicar em Exportar.")]
    ExportsPanelNotVisible,

    #[error("Botão 'Exportar' do cabeçalho não encontrado.")]
    ExportButtonMissing,

    #[error("Exports box não encontrado para baixar.")]
    ExportsPanelMissing,

    #[error("Nenhum item na lista de exports.")]
    EmptyExportList,

    #[error("Não consegui localizar botão de Download no item mais recente.")]
    DownloadButtonMissing,

    #[error("Timeout aguardando download do relatório.")]
    DownloadTimeout,

    #[error("Falha ao iniciar o navegador: {0}")]
    Launch(String),

    #[error("Chrome/Chromium não encontrado em {0:?}")]
    BrowserNotFound(PathBuf),

    #[error("Erro do navegador: {0}")]
    Browser(String),

    #[error("Configuração inválida: {0}")]
    Config(String),

    #[error("Erro de E/S: {0}")]
    Io(#[from] std::io::Error),
}

impl RoboError {
    /// Whether this is the "element cannot receive a pointer click" failure.
    pub fn is_not_clickable(&self) -> bool {
        matches!(self, RoboError::NotClickable(_))
    }
}

#[cfg(feature = "browser")]
impl From<chromiumoxide::error::CdpError> for RoboError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        RoboError::Browser(e.to_string())
    }
}
