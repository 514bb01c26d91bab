use std::time::Duration;

use prettytable::format::consts::FORMAT_CLEAN;
use prettytable::{Table, row};
use pricecache::{PriceError, PriceLookup};
use serde::Serialize;

use crate::settings::OutputFormat;

/// The outcome of a single command.
#[derive(Debug, Clone)]
pub enum Report {
    /// A single item lookup.
    Price {
        item_code: String,
        result: Result<f64, PriceError>,
        elapsed: Duration,
    },
    /// A batch lookup, failed items are not part of `prices`.
    Prices {
        requested: usize,
        prices: Vec<f64>,
        elapsed: Duration,
    },
    /// A batch lookup with the outcome of every item.
    Lookups {
        lookups: Vec<PriceLookup>,
        elapsed: Duration,
    },
    /// Repeated batch lookups.
    Replay { rounds: Vec<ReplayRound> },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayRound {
    pub round: usize,
    pub prices: Vec<f64>,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// The number of service calls during this round.
    pub service_calls: usize,
}

#[derive(Serialize)]
struct JsonLookup<'a> {
    item_code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> JsonLookup<'a> {
    fn new(item_code: &'a str, result: &Result<f64, PriceError>) -> Self {
        Self {
            item_code,
            price: result.as_ref().ok().copied(),
            error: result.as_ref().err().map(ToString::to_string),
        }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum JsonReport<'a> {
    Price {
        #[serde(flatten)]
        lookup: JsonLookup<'a>,
        #[serde(serialize_with = "serialize_millis")]
        elapsed: Duration,
    },
    Prices {
        requested: usize,
        prices: &'a [f64],
        #[serde(serialize_with = "serialize_millis")]
        elapsed: Duration,
    },
    Lookups {
        lookups: Vec<JsonLookup<'a>>,
        #[serde(serialize_with = "serialize_millis")]
        elapsed: Duration,
    },
    Replay {
        rounds: &'a [ReplayRound],
    },
}

fn serialize_millis<S: serde::Serializer>(
    duration: &Duration,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
}

impl Report {
    /// Whether the command should exit with a failure status.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Price { result: Err(_), .. })
    }

    pub fn print(&self, format: OutputFormat) -> anyhow::Result<()> {
        match format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&self.to_json())?;
                println!("{json}");
            }
            OutputFormat::Pretty => self.print_pretty(),
            OutputFormat::Compact => self.print_compact(),
        }
        Ok(())
    }

    fn to_json(&self) -> JsonReport<'_> {
        match self {
            Self::Price {
                item_code,
                result,
                elapsed,
            } => JsonReport::Price {
                lookup: JsonLookup::new(item_code, result),
                elapsed: *elapsed,
            },
            Self::Prices {
                requested,
                prices,
                elapsed,
            } => JsonReport::Prices {
                requested: *requested,
                prices,
                elapsed: *elapsed,
            },
            Self::Lookups { lookups, elapsed } => JsonReport::Lookups {
                lookups: lookups
                    .iter()
                    .map(|lookup| JsonLookup::new(&lookup.item_code, &lookup.result))
                    .collect(),
                elapsed: *elapsed,
            },
            Self::Replay { rounds } => JsonReport::Replay { rounds },
        }
    }

    fn print_pretty(&self) {
        match self {
            Self::Price {
                item_code,
                result,
                elapsed,
            } => {
                println!("{} ({elapsed:.2?})", format_lookup(item_code, result));
            }
            Self::Prices {
                requested,
                prices,
                elapsed,
            } => {
                for price in prices {
                    println!("{price}");
                }
                println!(
                    "{} of {requested} prices ({elapsed:.2?})",
                    prices.len()
                );
            }
            Self::Lookups { lookups, elapsed } => {
                for lookup in lookups {
                    println!("{}", format_lookup(&lookup.item_code, &lookup.result));
                }
                println!("({elapsed:.2?})");
            }
            Self::Replay { rounds } => {
                for round in rounds {
                    println!(
                        "round {}: {} prices, {} service calls ({:.2?})",
                        round.round,
                        round.prices.len(),
                        round.service_calls,
                        round.elapsed,
                    );
                }
            }
        }
    }

    fn print_compact(&self) {
        let mut table = Table::new();
        table.set_format(*FORMAT_CLEAN);

        match self {
            Self::Price {
                item_code, result, ..
            } => {
                table.set_titles(row![b => "Item", "Price"]);
                table.add_row(row![item_code, format_result(result)]);
            }
            Self::Prices { prices, .. } => {
                table.set_titles(row![b => "Price"]);
                for price in prices {
                    table.add_row(row![r->price]);
                }
            }
            Self::Lookups { lookups, .. } => {
                table.set_titles(row![b => "Item", "Price"]);
                for lookup in lookups {
                    table.add_row(row![lookup.item_code, format_result(&lookup.result)]);
                }
            }
            Self::Replay { rounds } => {
                table.set_titles(row![b => "Round", "Prices", "Service Calls", "Elapsed"]);
                for round in rounds {
                    table.add_row(row![
                        r->round.round,
                        r->round.prices.len(),
                        r->round.service_calls,
                        r->format!("{:.2?}", round.elapsed),
                    ]);
                }
            }
        }

        table.printstd();
    }
}

fn format_result(result: &Result<f64, PriceError>) -> String {
    match result {
        Ok(price) => price.to_string(),
        Err(err) => format!("error: {err}"),
    }
}

fn format_lookup(item_code: &str, result: &Result<f64, PriceError>) -> String {
    format!("{item_code}: {}", format_result(result))
}
