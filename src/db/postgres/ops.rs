use chrono::Utc;
use log::error;

use crate::db::models::{Pair, Token, TokenSupply};
use crate::db::postgres::PostgresClient;

const TOKEN_COLUMNS: &str = "id, address, symbol, decimals, price_usd, last_price_update";

const PAIR_COLUMNS: &str = r#"
    id, address, token0_id, token1_id, reserve0, reserve1, created_at,
    volume_1h, volume_24h, volume_7d, volume_30d, tvl_usd, pool_apr, fee_bps
"#;

impl PostgresClient {
    // ==================== TOKENS ====================

    pub async fn get_token(&self, id: &str) -> anyhow::Result<Option<Token>> {
        let client = self.pool.get().await?;
        let query = format!("SELECT {} FROM valuer.tokens WHERE id = $1", TOKEN_COLUMNS);

        let row = client.query_opt(&query, &[&id]).await?;
        Ok(row.as_ref().map(row_to_token))
    }

    /// Stored addresses may be checksummed, so both sides are lowercased.
    pub async fn get_token_by_address(&self, address: &str) -> anyhow::Result<Option<Token>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM valuer.tokens WHERE lower(address) = $1",
            TOKEN_COLUMNS
        );

        let row = client
            .query_opt(&query, &[&address.to_lowercase()])
            .await?;
        Ok(row.as_ref().map(row_to_token))
    }

    /// Get tokens by id (batched)
    pub async fn get_tokens(&self, ids: &[String]) -> anyhow::Result<Vec<Token>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM valuer.tokens WHERE id = ANY($1)",
            TOKEN_COLUMNS
        );

        let rows = client.query(&query, &[&ids]).await?;
        Ok(rows.iter().map(row_to_token).collect())
    }

    pub async fn list_tokens(&self) -> anyhow::Result<Vec<Token>> {
        let client = self.pool.get().await?;
        let query = format!("SELECT {} FROM valuer.tokens ORDER BY id", TOKEN_COLUMNS);

        let rows = client.query(&query, &[]).await?;
        Ok(rows.iter().map(row_to_token).collect())
    }

    pub async fn update_token_price(&self, id: &str, price_usd: f64) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            UPDATE valuer.tokens
            SET price_usd = $2, last_price_update = $3
            WHERE id = $1
        "#;

        client
            .execute(query, &[&id, &price_usd, &Utc::now()])
            .await
            .map_err(|e| {
                error!("Failed to update price of token {}: {:?}", id, e);
                e
            })?;

        Ok(())
    }

    pub async fn get_token_supply(&self, id: &str) -> anyhow::Result<Option<TokenSupply>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT total_supply, circulating_supply
            FROM valuer.tokens
            WHERE id = $1
        "#;

        let row = client.query_opt(query, &[&id]).await?;
        Ok(row.map(|row| TokenSupply {
            total: row.get("total_supply"),
            circulating: row.get("circulating_supply"),
        }))
    }

    // ==================== PAIRS ====================

    pub async fn get_pair(&self, id: &str) -> anyhow::Result<Option<Pair>> {
        let client = self.pool.get().await?;
        let query = format!("SELECT {} FROM valuer.pairs WHERE id = $1", PAIR_COLUMNS);

        let row = client.query_opt(&query, &[&id]).await?;
        Ok(row.as_ref().map(row_to_pair))
    }

    pub async fn find_pairs_by_token(&self, token_id: &str) -> anyhow::Result<Vec<Pair>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM valuer.pairs WHERE token0_id = $1 OR token1_id = $1",
            PAIR_COLUMNS
        );

        let rows = client.query(&query, &[&token_id]).await?;
        Ok(rows.iter().map(row_to_pair).collect())
    }

    pub async fn list_pairs(&self) -> anyhow::Result<Vec<Pair>> {
        let client = self.pool.get().await?;
        let query = format!("SELECT {} FROM valuer.pairs ORDER BY id", PAIR_COLUMNS);

        let rows = client.query(&query, &[]).await?;
        Ok(rows.iter().map(row_to_pair).collect())
    }
}

// ==================== HELPER FUNCTIONS ====================

fn row_to_token(row: &tokio_postgres::Row) -> Token {
    // Lowercase addresses for consistent comparisons
    let address: String = row.get("address");
    let decimals: i16 = row.get("decimals");
    Token {
        id: row.get("id"),
        address: address.to_lowercase(),
        symbol: row.get("symbol"),
        decimals: decimals.clamp(0, u8::MAX as i16) as u8,
        price_usd: row.get("price_usd"),
        last_price_update: row.get("last_price_update"),
    }
}

fn row_to_pair(row: &tokio_postgres::Row) -> Pair {
    let address: String = row.get("address");
    Pair {
        id: row.get("id"),
        address: address.to_lowercase(),
        token0_id: row.get("token0_id"),
        token1_id: row.get("token1_id"),
        reserve0: row.get("reserve0"),
        reserve1: row.get("reserve1"),
        created_at: row.get("created_at"),
        volume_1h: row.get("volume_1h"),
        volume_24h: row.get("volume_24h"),
        volume_7d: row.get("volume_7d"),
        volume_30d: row.get("volume_30d"),
        tvl_usd: row.get("tvl_usd"),
        pool_apr: row.get("pool_apr"),
        fee_bps: row.get("fee_bps"),
    }
}
