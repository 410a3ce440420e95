use anyhow::Result;
use google_sheets4::api::{
    AddSheetRequest, BatchUpdateSpreadsheetRequest, ClearValuesRequest, GridProperties, Request,
    SheetProperties, ValueRange,
};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, info};

use crate::auth::{create_sheets_hub, SheetsHub};
use crate::cfg::SheetCfg;
use crate::transform::ClientRow;

/// Columns shown first, in this order, when present in the data.
pub const PREFERRED_COLUMNS: [&str; 15] = [
    "id",
    "partner_account",
    "partner_account_name",
    "client_uid",
    "client_account",
    "client_account_type",
    "country",
    "currency",
    "reg_date",
    "trade_finish",
    "volume_lots",
    "volume_usd",
    "reward",
    "reward_usd",
    "comment",
];

pub const EMPTY_MARKER: &str = "No data";

const NEW_TAB_ROWS: i32 = 100;
const NEW_TAB_COLUMNS: i32 = 26;

/// Replaces one tab of a spreadsheet with the latest rows on every cycle.
pub struct SheetMirror {
    hub: SheetsHub,
    sheet_id: String,
    tab_name: String,
}

impl SheetMirror {
    pub async fn connect(cfg: &SheetCfg) -> Result<Self> {
        let hub = create_sheets_hub(&cfg.credentials).await?;
        Ok(Self::with_hub(hub, &cfg.sheet_id, &cfg.tab_name))
    }

    pub fn with_hub(hub: SheetsHub, sheet_id: &str, tab_name: &str) -> Self {
        Self {
            hub,
            sheet_id: sheet_id.to_string(),
            tab_name: tab_name.to_string(),
        }
    }

    pub async fn write_snapshot(&self, rows: &[ClientRow]) -> Result<()> {
        info!("Writing {} rows to sheet {} tab '{}'", rows.len(), self.sheet_id, self.tab_name);

        self.reset_tab().await?;

        let request = ValueRange {
            major_dimension: Some("ROWS".to_string()),
            values: Some(build_grid(rows)),
            ..Default::default()
        };
        let range = format!("{}!A1", quote_tab(&self.tab_name));

        let result = self
            .hub
            .spreadsheets()
            .values_update(request, &self.sheet_id, &range)
            .value_input_option("RAW")
            .doit()
            .await;

        match result {
            Ok((_, response)) => {
                debug!("Updated {} cells", response.updated_cells.unwrap_or_default());
                info!("Wrote {} rows to sheet '{}'", rows.len(), self.tab_name);
                Ok(())
            }
            Err(e) => anyhow::bail!("Failed to write rows to sheet '{}': {}", self.tab_name, e),
        }
    }

    /// Clears the tab if it exists, otherwise adds it.
    async fn reset_tab(&self) -> Result<()> {
        let spreadsheet = match self.hub.spreadsheets().get(&self.sheet_id).doit().await {
            Ok((_, spreadsheet)) => spreadsheet,
            Err(e) => anyhow::bail!("Failed to open spreadsheet {}: {}", self.sheet_id, e),
        };

        let exists = spreadsheet
            .sheets
            .unwrap_or_default()
            .iter()
            .filter_map(|sheet| sheet.properties.as_ref()?.title.as_deref())
            .any(|title| title == self.tab_name);

        if exists {
            debug!("Clearing existing tab '{}'", self.tab_name);
            let result = self
                .hub
                .spreadsheets()
                .values_clear(ClearValuesRequest::default(), &self.sheet_id, &quote_tab(&self.tab_name))
                .doit()
                .await;
            if let Err(e) = result {
                anyhow::bail!("Failed to clear tab '{}': {}", self.tab_name, e);
            }
        } else {
            info!("Tab '{}' not found, creating it", self.tab_name);
            let add = Request {
                add_sheet: Some(AddSheetRequest {
                    properties: Some(SheetProperties {
                        title: Some(self.tab_name.clone()),
                        grid_properties: Some(GridProperties {
                            row_count: Some(NEW_TAB_ROWS),
                            column_count: Some(NEW_TAB_COLUMNS),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }),
                }),
                ..Default::default()
            };
            let request = BatchUpdateSpreadsheetRequest {
                requests: Some(vec![add]),
                ..Default::default()
            };
            let result = self.hub.spreadsheets().batch_update(request, &self.sheet_id).doit().await;
            if let Err(e) = result {
                anyhow::bail!("Failed to create tab '{}': {}", self.tab_name, e);
            }
        }

        Ok(())
    }
}

/// Preferred columns that occur, then every other observed column sorted.
pub fn column_order(rows: &[ClientRow]) -> Vec<String> {
    let seen: BTreeSet<&str> = rows.iter().flat_map(|row| row.keys().map(String::as_str)).collect();

    let mut columns: Vec<String> = PREFERRED_COLUMNS
        .iter()
        .filter(|c| seen.contains(*c))
        .map(|c| c.to_string())
        .collect();
    columns.extend(
        seen.iter()
            .filter(|c| !PREFERRED_COLUMNS.contains(c))
            .map(|c| c.to_string()),
    );
    columns
}

/// Header plus one line per row; a lone marker cell when there are no rows.
pub fn build_grid(rows: &[ClientRow]) -> Vec<Vec<Value>> {
    if rows.is_empty() {
        return vec![vec![Value::String(EMPTY_MARKER.to_string())]];
    }

    let columns = column_order(rows);
    let mut grid = Vec::with_capacity(rows.len() + 1);
    grid.push(columns.iter().cloned().map(Value::String).collect());
    for row in rows {
        grid.push(columns.iter().map(|c| cell(row.get(c))).collect());
    }
    grid
}

fn cell(value: Option<&Value>) -> Value {
    match value {
        None | Some(Value::Null) => Value::String(String::new()),
        Some(v @ (Value::String(_) | Value::Number(_) | Value::Bool(_))) => v.clone(),
        Some(other) => Value::String(other.to_string()),
    }
}

/// A1 notation needs tab names quoted, with embedded quotes doubled.
fn quote_tab(name: &str) -> String {
    format!("'{}'", name.replace('\'', "''"))
}
