use crate::repository::{EventStats, NftBalance, TransferEvent};
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn csv_string(wtr: Writer<Vec<u8>>) -> String {
    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

fn sync_status(balance: &NftBalance) -> &'static str {
    if balance.synced { "synced" } else { "pending" }
}

pub fn format_balances(balances: &[NftBalance], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if balances.is_empty() {
                return "No balances found.".to_string();
            }

            let mut table = new_table(vec![
                "Standard", "Contract", "Token ID", "Name", "Balance", "Status",
            ]);
            for balance in balances {
                table.add_row(vec![
                    Cell::new(balance.nft.nft_type),
                    Cell::new(format!("{:?}", balance.nft.contract_address)),
                    Cell::new(balance.nft.token_id),
                    Cell::new(&balance.nft.token_name),
                    Cell::new(balance.balance),
                    Cell::new(sync_status(balance)),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let json_balances: Vec<_> = balances
                .iter()
                .map(|b| {
                    json!({
                        "type": b.nft.nft_type,
                        "contract_address": format!("{:?}", b.nft.contract_address),
                        "token_id": b.nft.token_id.to_string(),
                        "token_name": b.nft.token_name,
                        "balance": b.balance,
                        "synced": b.synced,
                    })
                })
                .collect();

            serde_json::to_string_pretty(&json_balances).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record([
                "type",
                "contract_address",
                "token_id",
                "token_name",
                "balance",
                "synced",
            ]);
            for b in balances {
                let _ = wtr.write_record([
                    b.nft.nft_type.as_str(),
                    &format!("{:?}", b.nft.contract_address),
                    &b.nft.token_id.to_string(),
                    &b.nft.token_name,
                    &b.balance.to_string(),
                    &b.synced.to_string(),
                ]);
            }
            csv_string(wtr)
        }
    }
}

pub fn format_events(events: &[TransferEvent], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if events.is_empty() {
                return "No events found.".to_string();
            }

            let mut table = new_table(vec![
                "Block", "Contract", "Token ID", "Value", "From", "To", "Tx Hash",
            ]);
            for event in events {
                table.add_row(vec![
                    Cell::new(event.block_number),
                    Cell::new(format!("{:?}", event.contract_address)),
                    Cell::new(event.token_id),
                    Cell::new(event.token_value.map_or("-".to_string(), |v| v.to_string())),
                    Cell::new(format!("{:?}", event.from)),
                    Cell::new(format!("{:?}", event.to)),
                    Cell::new(format_tx_hash(&format!("{:?}", event.tx_hash))),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let json_events: Vec<_> = events
                .iter()
                .map(|e| {
                    json!({
                        "block_number": e.block_number,
                        "transaction_hash": format!("{:?}", e.tx_hash),
                        "contract_address": format!("{:?}", e.contract_address),
                        "from": format!("{:?}", e.from),
                        "to": format!("{:?}", e.to),
                        "token_id": e.token_id.to_string(),
                        "token_value": e.token_value.map(|v| v.to_string()),
                        "token_name": e.token_name,
                        "token_symbol": e.token_symbol,
                        "token_decimal": e.token_decimal,
                    })
                })
                .collect();

            serde_json::to_string_pretty(&json_events).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record([
                "block_number",
                "transaction_hash",
                "contract_address",
                "from",
                "to",
                "token_id",
                "token_value",
                "token_name",
                "token_symbol",
            ]);
            for e in events {
                let _ = wtr.write_record([
                    &e.block_number.to_string(),
                    &format!("{:?}", e.tx_hash),
                    &format!("{:?}", e.contract_address),
                    &format!("{:?}", e.from),
                    &format!("{:?}", e.to),
                    &e.token_id.to_string(),
                    &e.token_value.map(|v| v.to_string()).unwrap_or_default(),
                    &e.token_name,
                    &e.token_symbol,
                ]);
            }
            csv_string(wtr)
        }
    }
}

pub fn format_stats(stats: &[EventStats], balances: &[NftBalance], format: &OutputFormat) -> String {
    let tracked = balances.len();
    let pending = balances.iter().filter(|b| !b.synced).count();
    let owned = balances.iter().filter(|b| b.balance > 0).count();
    let block = |b: Option<u64>| b.map_or("N/A".to_string(), |b| b.to_string());

    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Metric", "Value"]);

            for s in stats {
                table.add_row(vec![
                    Cell::new(format!("{} events", s.nft_type)),
                    Cell::new(s.total_events),
                ]);
                table.add_row(vec![
                    Cell::new(format!("{} tokens seen", s.nft_type)),
                    Cell::new(s.unique_tokens),
                ]);
                table.add_row(vec![
                    Cell::new(format!("{} block range", s.nft_type)),
                    Cell::new(format!("{} - {}", block(s.earliest_block), block(s.latest_block))),
                ]);
            }
            table.add_row(vec![Cell::new("Tracked tokens"), Cell::new(tracked)]);
            table.add_row(vec![Cell::new("Pending sync"), Cell::new(pending)]);
            table.add_row(vec![Cell::new("Owned tokens"), Cell::new(owned)]);

            table.to_string()
        }
        OutputFormat::Json => {
            let standards: Vec<_> = stats
                .iter()
                .map(|s| {
                    json!({
                        "type": s.nft_type,
                        "total_events": s.total_events,
                        "unique_tokens": s.unique_tokens,
                        "earliest_block": s.earliest_block,
                        "latest_block": s.latest_block,
                    })
                })
                .collect();

            serde_json::to_string_pretty(&json!({
                "standards": standards,
                "tracked_tokens": tracked,
                "pending_sync": pending,
                "owned_tokens": owned,
            }))
            .unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            for s in stats {
                let _ = wtr.write_record([
                    &format!("{}_events", s.nft_type),
                    &s.total_events.to_string(),
                ]);
                let _ = wtr.write_record([
                    &format!("{}_unique_tokens", s.nft_type),
                    &s.unique_tokens.to_string(),
                ]);
                let _ = wtr.write_record([
                    &format!("{}_latest_block", s.nft_type),
                    &block(s.latest_block),
                ]);
            }
            let _ = wtr.write_record(["tracked_tokens", &tracked.to_string()]);
            let _ = wtr.write_record(["pending_sync", &pending.to_string()]);
            let _ = wtr.write_record(["owned_tokens", &owned.to_string()]);
            csv_string(wtr)
        }
    }
}

fn format_tx_hash(hash: &str) -> String {
    format!("{}...{}", &hash[..6], &hash[hash.len() - 4..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{Nft, NftType};
    use alloy_primitives::{Address, U256};

    fn balance(synced: bool) -> NftBalance {
        NftBalance {
            nft: Nft::new(NftType::Eip1155, Address::repeat_byte(0x11), U256::from(5))
                .with_name("Swords"),
            balance: 3,
            synced,
            revision: 0,
        }
    }

    #[test]
    fn csv_balances_have_header_and_rows() {
        let output = format_balances(&[balance(true), balance(false)], &OutputFormat::Csv);
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("type,contract_address"));
        assert!(lines[1].starts_with("eip1155,"));
        assert!(lines[2].ends_with(",false"));
    }

    #[test]
    fn json_balances_render_token_id_as_decimal_string() {
        let output = format_balances(&[balance(true)], &OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(parsed[0]["token_id"], "5");
        assert_eq!(parsed[0]["type"], "eip1155");
        assert_eq!(parsed[0]["balance"], 3);
    }

    #[test]
    fn table_shows_full_contract_address() {
        let output = format_balances(&[balance(true)], &OutputFormat::Table);
        let full = format!("{:?}", Address::repeat_byte(0x11));

        assert_eq!(full.len(), 42);
        assert!(output.contains(&full));
        assert!(!output.contains('…'));
    }

    #[test]
    fn empty_table_says_so() {
        assert_eq!(format_balances(&[], &OutputFormat::Table), "No balances found.");
    }
}
