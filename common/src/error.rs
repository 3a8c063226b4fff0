use std::fmt;

use thiserror::Error;

/// Violación del invariante de ensamblado: los índices traducidos deben
/// cubrir exactamente `0..expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralMismatch {
    pub expected: usize,
    pub missing: Vec<usize>,
    pub duplicated: Vec<usize>,
    pub out_of_range: Vec<usize>,
}

impl fmt::Display for StructuralMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "se esperaban los índices 0..{}", self.expected)?;
        if !self.missing.is_empty() {
            write!(f, "; faltan {:?}", self.missing)?;
        }
        if !self.duplicated.is_empty() {
            write!(f, "; duplicados {:?}", self.duplicated)?;
        }
        if !self.out_of_range.is_empty() {
            write!(f, "; fuera de rango {:?}", self.out_of_range)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("error de E/S: {0}")]
    Io(#[from] std::io::Error),

    #[error("paquete zip inválido: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML inválido: {0}")]
    Xml(String),

    #[error("el documento no es UTF-8 válido")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("falta la parte {0} en el paquete")]
    MissingPart(String),

    #[error("formato no soportado: {0}")]
    Unsupported(String),

    #[error("documento mal formado: {0}")]
    Malformed(String),

    #[error("desajuste estructural: {0}")]
    StructuralMismatch(StructuralMismatch),
}

impl FormatError {
    pub(crate) fn xml(e: impl fmt::Display) -> Self {
        FormatError::Xml(e.to_string())
    }

    pub fn is_structural_mismatch(&self) -> bool {
        matches!(self, FormatError::StructuralMismatch(_))
    }
}

pub type Result<T> = std::result::Result<T, FormatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_describe_faltantes_y_duplicados() {
        let m = StructuralMismatch {
            expected: 10,
            missing: vec![3],
            duplicated: vec![9],
            out_of_range: vec![],
        };
        let msg = FormatError::StructuralMismatch(m).to_string();
        assert!(msg.contains("0..10"));
        assert!(msg.contains("faltan [3]"));
        assert!(msg.contains("duplicados [9]"));
        assert!(!msg.contains("fuera de rango"));
    }
}
