use super::connection::BarStore;
use super::error::{Result, StoreError};
use crate::calendar::CalendarDay;
use crate::interval::Interval;
use crate::models::Bar;
use chrono::{NaiveDate, NaiveTime};
use rusqlite::params;

impl BarStore {
    /// Idempotent upsert keyed on (symbol, interval, timestamp).
    /// Returns the number of rows written.
    pub fn bulk_upsert(&self, bars: &[Bar]) -> Result<usize> {
        let mut conn = self.connection();
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Insert(e.to_string()))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO bars (symbol, interval, timestamp, open, high, low, close, volume)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT (symbol, interval, timestamp) DO UPDATE SET
                         open = excluded.open,
                         high = excluded.high,
                         low = excluded.low,
                         close = excluded.close,
                         volume = excluded.volume",
                )
                .map_err(|e| StoreError::Insert(e.to_string()))?;

            for bar in bars {
                stmt.execute(params![
                    bar.symbol,
                    bar.interval.to_string(),
                    bar.timestamp,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                ])
                .map_err(|e| StoreError::Insert(e.to_string()))?;
            }
        }

        tx.commit().map_err(|e| StoreError::Insert(e.to_string()))?;
        Ok(bars.len())
    }

    /// Bars in [start_ts, end_ts), ordered by timestamp.
    pub fn get_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<Vec<Bar>> {
        let conn = self.connection();
        let mut stmt = conn
            .prepare(
                "SELECT symbol, interval, timestamp, open, high, low, close, volume
                 FROM bars
                 WHERE symbol = ? AND interval = ? AND timestamp >= ? AND timestamp < ?
                 ORDER BY timestamp",
            )
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let rows = stmt
            .query_map(
                params![symbol, interval.to_string(), start_ts, end_ts],
                |row| {
                    let tag: String = row.get(1)?;
                    let interval: Interval = tag.parse().map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            1,
                            rusqlite::types::Type::Text,
                            Box::new(std::io::Error::new(
                                std::io::ErrorKind::InvalidData,
                                format!("{e}"),
                            )),
                        )
                    })?;
                    Ok(Bar {
                        symbol: row.get(0)?,
                        interval,
                        timestamp: row.get(2)?,
                        open: row.get(3)?,
                        high: row.get(4)?,
                        low: row.get(5)?,
                        close: row.get(6)?,
                        volume: row.get(7)?,
                    })
                },
            )
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut bars = Vec::new();
        for bar in rows {
            bars.push(bar.map_err(|e| StoreError::Query(e.to_string()))?);
        }
        Ok(bars)
    }

    /// (min_ts, max_ts) over every interval stored for the symbol.
    pub fn date_range(&self, symbol: &str) -> Result<Option<(i64, i64)>> {
        let conn = self.connection();
        let range: (Option<i64>, Option<i64>) = conn
            .query_row(
                "SELECT MIN(timestamp), MAX(timestamp) FROM bars WHERE symbol = ?",
                params![symbol],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| StoreError::Query(e.to_string()))?;

        Ok(match range {
            (Some(min), Some(max)) => Some((min, max)),
            _ => None,
        })
    }

    pub fn has_data(
        &self,
        symbol: &str,
        interval: Interval,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<bool> {
        Ok(self.count_bars(symbol, interval, start_ts, end_ts)? > 0)
    }

    pub fn count_bars(
        &self,
        symbol: &str,
        interval: Interval,
        start_ts: i64,
        end_ts: i64,
    ) -> Result<usize> {
        let conn = self.connection();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM bars
                 WHERE symbol = ? AND interval = ? AND timestamp >= ? AND timestamp < ?",
                params![symbol, interval.to_string(), start_ts, end_ts],
                |row| row.get(0),
            )
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(count as usize)
    }

    pub fn upsert_calendar_days(&self, days: &[CalendarDay]) -> Result<usize> {
        let mut conn = self.connection();
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Insert(e.to_string()))?;

        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO calendar_days
                        (date, is_holiday, regular_open, regular_close, early_close, exchange_group)
                     VALUES (?, ?, ?, ?, ?, ?)
                     ON CONFLICT (date) DO UPDATE SET
                         is_holiday = excluded.is_holiday,
                         regular_open = excluded.regular_open,
                         regular_close = excluded.regular_close,
                         early_close = excluded.early_close,
                         exchange_group = excluded.exchange_group",
                )
                .map_err(|e| StoreError::Insert(e.to_string()))?;

            for day in days {
                stmt.execute(params![
                    day.date.to_string(),
                    day.is_holiday,
                    day.open.format("%H:%M:%S").to_string(),
                    day.close.format("%H:%M:%S").to_string(),
                    day.early_close.map(|t| t.format("%H:%M:%S").to_string()),
                    day.exchange_group,
                ])
                .map_err(|e| StoreError::Insert(e.to_string()))?;
            }
        }

        tx.commit().map_err(|e| StoreError::Insert(e.to_string()))?;
        Ok(days.len())
    }

    pub fn load_calendar_days(&self, exchange_group: &str) -> Result<Vec<CalendarDay>> {
        let conn = self.connection();
        let mut stmt = conn
            .prepare(
                "SELECT date, is_holiday, regular_open, regular_close, early_close, exchange_group
                 FROM calendar_days
                 WHERE exchange_group = ?
                 ORDER BY date",
            )
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let rows = stmt
            .query_map(params![exchange_group], |row| {
                let date_str: String = row.get(0)?;
                let open_str: String = row.get(2)?;
                let close_str: String = row.get(3)?;
                let early_str: Option<String> = row.get(4)?;
                Ok((
                    date_str,
                    row.get::<_, bool>(1)?,
                    open_str,
                    close_str,
                    early_str,
                    row.get::<_, String>(5)?,
                ))
            })
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut days = Vec::new();
        for row in rows {
            let (date_str, is_holiday, open_str, close_str, early_str, group) =
                row.map_err(|e| StoreError::Query(e.to_string()))?;
            days.push(CalendarDay {
                date: parse_date(&date_str)?,
                is_holiday,
                open: parse_time(&open_str)?,
                close: parse_time(&close_str)?,
                early_close: early_str.as_deref().map(parse_time).transpose()?,
                exchange_group: group,
            });
        }
        Ok(days)
    }
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    s.parse()
        .map_err(|_| StoreError::Corrupt(format!("bad calendar date: {s}")))
}

fn parse_time(s: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .map_err(|_| StoreError::Corrupt(format!("bad calendar time: {s}")))
}
