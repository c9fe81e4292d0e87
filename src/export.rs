use std::{path::{Path, PathBuf}, sync::Arc};

use crossbeam::channel::{Sender, TryRecvError};
use rust_xlsxwriter::{Format, Workbook};

use crate::impls::LoggableErrorResult;
use crate::persistent::{Storage, WarrantyRow};

pub enum ExportAction {
    Activated(WarrantyRow),
    Rebuild,
}

const HEADERS: [&str; 6] = ["Дата", "ID пользователя", "Username", "Товар", "Скриншот", "Гарантия до"];

pub fn write_workbook(path: &Path, rows: &[WarrantyRow]) -> anyhow::Result<()> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Гарантии")?;
    for (col, header) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
        sheet.set_column_width(col as u16, 20)?;
    }
    for (i, row) in rows.iter().enumerate() {
        let r = i as u32 + 1;
        sheet.write_string(r, 0, row.entry.started.format("%d.%m.%Y").to_string())?;
        sheet.write_number(r, 1, row.user_id as f64)?;
        sheet.write_string(r, 2, row.username.as_deref().map(|u| format!("@{}", u)).unwrap_or_default())?;
        sheet.write_string(r, 3, row.entry.product_name.as_str())?;
        sheet.write_string(r, 4, row.entry.screenshot.as_str())?;
        sheet.write_string(r, 5, row.entry.ends.format("%d.%m.%Y").to_string())?;
    }
    workbook.save(path)?;
    Ok(())
}

async fn save(path: PathBuf, rows: Vec<WarrantyRow>) -> anyhow::Result<Vec<WarrantyRow>> {
    tokio::task::spawn_blocking(move || write_workbook(&path, &rows).map(|_| rows)).await?
}

/// Keeps the spreadsheet at `path` in sync with warranty activations.
pub async fn worker(storage: Arc<Storage>, path: PathBuf) -> anyhow::Result<Sender<ExportAction>> {
    let (s, r) = crossbeam::channel::unbounded();
    let mut rows = storage.warranty_rows().await?;
    rows = save(path.clone(), rows).await?;
    log::info!("warranty export written to {}", path.display());
    tokio::spawn(async move {
        loop {
            let action = match r.try_recv() {
                Ok(action) => action,
                Err(TryRecvError::Empty) => {
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    continue
                }
                Err(TryRecvError::Disconnected) => {
                    log::info!("export worker stopped");
                    break
                }
            };
            match action {
                ExportAction::Activated(row) => rows.push(row),
                ExportAction::Rebuild => match storage.warranty_rows().await.ok_or_log() {
                    Some(fresh) => rows = fresh,
                    None => continue,
                },
            }
            if let Some(saved) = save(path.clone(), std::mem::take(&mut rows)).await.ok_or_log() {
                rows = saved;
            } else {
                rows = storage.warranty_rows().await.ok_or_log().unwrap_or_default();
            }
        }
    });
    Ok(s)
}
