use std::io;
use std::path::{Path, PathBuf};

use common::DocumentKind;
use tracing::{debug, warn};
use uuid::Uuid;

pub const OUTPUT_SUBDIR: &str = "translate";

/// `<dir>/translate/<stem>_translated_<8 hex>.<ext>`
pub fn output_path(storage_dir: &Path, source_ref: &str, kind: DocumentKind) -> PathBuf {
    let stem = Path::new(source_ref)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("document");
    let suffix = Uuid::new_v4().simple().to_string();

    storage_dir
        .join(OUTPUT_SUBDIR)
        .join(format!("{}_translated_{}.{}", stem, &suffix[..8], kind.extension()))
}

pub async fn write_output(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    debug!("escrito {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

/// Borra un artefacto; que ya no exista no es un error.
pub async fn remove_output(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            warn!("{} ya no existía", path.display());
            Ok(())
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nombre_de_salida() {
        let p = output_path(Path::new("/data"), "/uploads/Informe anual.docx", DocumentKind::Docx);
        assert!(p.starts_with("/data/translate"));

        let name = p.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("Informe anual_translated_"));
        assert!(name.ends_with(".docx"));
        assert_eq!(name.len(), "Informe anual_translated_".len() + 8 + ".docx".len());
    }

    #[tokio::test]
    async fn escribir_y_borrar() {
        let dir = std::env::temp_dir().join(format!("doctrans-storage-{}", Uuid::new_v4()));
        let path = output_path(&dir, "a.txt", DocumentKind::Txt);

        write_output(&path, b"hola").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"hola");

        remove_output(&path).await.unwrap();
        remove_output(&path).await.unwrap();
        assert!(!path.exists());

        let _ = std::fs::remove_dir_all(&dir);
    }
}
