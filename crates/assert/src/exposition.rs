//! Parser for the Prometheus text exposition format.
//!
//! Sample values are kept as written; they are compared through the
//! predicate engine later. Summary and histogram series are folded into one
//! sample per label set (without `quantile` / `le`).

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::model::{Family, HistogramSample, Labels, MetricType, PlainSample, Sample, SummarySample};

/// Parse exposition text into metric families, in order of first appearance.
///
/// Families declared by `# TYPE` but without samples are dropped.
///
/// # Errors
///
/// Returns [`Error::Exposition`] with the 1-based line number of the first
/// malformed line.
pub fn parse_exposition(text: &str) -> Result<Vec<Family>> {
    let mut parser = Parser::default();
    for (index, line) in text.lines().enumerate() {
        parser
            .line(line.trim())
            .map_err(|reason| Error::Exposition { line: index + 1, reason })?;
    }
    Ok(parser.finish())
}

type LineResult<T> = std::result::Result<T, String>;

#[derive(Default)]
struct Parser {
    families: Vec<Family>,
    by_name: HashMap<String, usize>,
    types: HashMap<String, MetricType>,
    help: HashMap<String, String>,
    /// (family index, labels without quantile/le) → sample index
    series: HashMap<(usize, Labels), usize>,
}

enum Part {
    Plain,
    Quantile(String),
    Bucket(String),
    Sum,
    Count,
}

impl Parser {
    fn line(&mut self, line: &str) -> LineResult<()> {
        if line.is_empty() {
            return Ok(());
        }
        if let Some(comment) = line.strip_prefix('#') {
            return self.comment(comment.trim_start());
        }
        self.sample(line)
    }

    fn comment(&mut self, comment: &str) -> LineResult<()> {
        let mut parts = comment.splitn(3, char::is_whitespace);
        let keyword = parts.next().unwrap_or_default();
        let name = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default().trim();

        match keyword {
            "HELP" => {
                validate_name(name)?;
                self.help.insert(name.to_string(), unescape_help(rest));
            }
            "TYPE" => {
                validate_name(name)?;
                let kind: MetricType = rest.parse()?;
                if self.by_name.contains_key(name) {
                    return Err(format!("TYPE for '{name}' after its samples"));
                }
                if self.types.insert(name.to_string(), kind).is_some() {
                    return Err(format!("second TYPE line for '{name}'"));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn sample(&mut self, line: &str) -> LineResult<()> {
        let name_end = line
            .find(|c: char| c == '{' || c.is_whitespace())
            .ok_or_else(|| "sample without value".to_string())?;
        let name = &line[..name_end];
        validate_name(name)?;

        let mut rest = &line[name_end..];
        let mut labels = Labels::new();
        if let Some(body) = rest.strip_prefix('{') {
            let (parsed, after) = parse_labels(body)?;
            labels = parsed;
            rest = after;
        }

        let mut fields = rest.split_whitespace();
        let value = fields.next().ok_or_else(|| format!("sample '{name}' without value"))?;
        validate_value(value)?;
        let timestamp = fields
            .next()
            .map(|ts| {
                ts.parse::<i64>()
                    .map(|_| ts.to_string())
                    .map_err(|_| format!("invalid timestamp '{ts}'"))
            })
            .transpose()?;
        if fields.next().is_some() {
            return Err(format!("trailing text after sample '{name}'"));
        }

        let (family, part) = self.resolve(name, &mut labels)?;
        self.record(family, part, labels, value.to_string(), timestamp)
    }

    /// Find the family a series belongs to and which part of a sample it is.
    fn resolve(&self, name: &str, labels: &mut Labels) -> LineResult<(String, Part)> {
        let declared = |n: &str| self.types.get(n).copied();

        match declared(name) {
            Some(MetricType::Summary) => {
                let quantile = labels
                    .remove("quantile")
                    .ok_or_else(|| format!("summary '{name}' sample without quantile label"))?;
                return Ok((name.to_string(), Part::Quantile(quantile)));
            }
            Some(MetricType::Histogram) => {
                return Err(format!("histogram '{name}' sample without _bucket, _sum or _count suffix"));
            }
            _ => {}
        }

        for (suffix, kinds) in [
            ("_bucket", &[MetricType::Histogram][..]),
            ("_sum", &[MetricType::Summary, MetricType::Histogram][..]),
            ("_count", &[MetricType::Summary, MetricType::Histogram][..]),
        ] {
            let Some(base) = name.strip_suffix(suffix) else {
                continue;
            };
            if !declared(base).is_some_and(|k| kinds.contains(&k)) {
                continue;
            }
            let part = match suffix {
                "_bucket" => Part::Bucket(
                    labels
                        .remove("le")
                        .ok_or_else(|| format!("histogram bucket '{name}' without le label"))?,
                ),
                "_sum" => Part::Sum,
                _ => Part::Count,
            };
            return Ok((base.to_string(), part));
        }

        Ok((name.to_string(), Part::Plain))
    }

    fn record(
        &mut self,
        name: String,
        part: Part,
        labels: Labels,
        value: String,
        timestamp_ms: Option<String>,
    ) -> LineResult<()> {
        let kind = self.types.get(&name).copied().unwrap_or(MetricType::Untyped);
        let family = match self.by_name.get(&name) {
            Some(&index) => index,
            None => {
                self.families.push(Family::new(name.clone(), kind));
                self.by_name.insert(name, self.families.len() - 1);
                self.families.len() - 1
            }
        };

        if let Part::Plain = part {
            self.families[family].metrics.push(Sample::Plain(PlainSample {
                labels,
                timestamp_ms,
                value,
            }));
            return Ok(());
        }

        let slot = match self.series.get(&(family, labels.clone())) {
            Some(&slot) => slot,
            None => {
                let metrics = &mut self.families[family].metrics;
                metrics.push(if kind == MetricType::Summary {
                    Sample::Summary(SummarySample {
                        labels: labels.clone(),
                        ..SummarySample::default()
                    })
                } else {
                    Sample::Histogram(HistogramSample {
                        labels: labels.clone(),
                        ..HistogramSample::default()
                    })
                });
                self.series.insert((family, labels), metrics.len() - 1);
                metrics.len() - 1
            }
        };

        match (&mut self.families[family].metrics[slot], part) {
            (Sample::Summary(s), Part::Quantile(q)) => {
                s.quantiles.insert(q, value);
                s.timestamp_ms = timestamp_ms.or(s.timestamp_ms.take());
            }
            (Sample::Histogram(h), Part::Bucket(le)) => {
                h.buckets.insert(le, value);
                h.timestamp_ms = timestamp_ms.or(h.timestamp_ms.take());
            }
            (Sample::Summary(SummarySample { sum, .. }) | Sample::Histogram(HistogramSample { sum, .. }), Part::Sum) => {
                *sum = value;
            }
            (Sample::Summary(SummarySample { count, .. }) | Sample::Histogram(HistogramSample { count, .. }), Part::Count) => {
                *count = value;
            }
            _ => return Err("series does not fit its family type".to_string()),
        }
        Ok(())
    }

    fn finish(mut self) -> Vec<Family> {
        for family in &mut self.families {
            if let Some(help) = self.help.remove(&family.name) {
                family.help = help;
            }
        }
        self.families
    }
}

fn validate_name(name: &str) -> LineResult<()> {
    let mut chars = name.chars();
    let valid_first = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == ':');
    if valid_first && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':') {
        Ok(())
    } else {
        Err(format!("invalid metric name '{name}'"))
    }
}

fn validate_value(value: &str) -> LineResult<()> {
    match value {
        "+Inf" | "-Inf" | "Inf" | "NaN" => Ok(()),
        _ => value
            .parse::<f64>()
            .map(|_| ())
            .map_err(|_| format!("invalid sample value '{value}'")),
    }
}

/// Parse `name="value",...}`; returns the labels and the text after `}`.
fn parse_labels(body: &str) -> LineResult<(Labels, &str)> {
    let mut labels = Labels::new();
    let mut rest = body;

    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix('}') {
            return Ok((labels, after));
        }

        let eq = rest.find('=').ok_or_else(|| "label without value".to_string())?;
        let name = rest[..eq].trim();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(format!("invalid label name '{name}'"));
        }
        rest = rest[eq + 1..]
            .trim_start()
            .strip_prefix('"')
            .ok_or_else(|| format!("label '{name}' value is not quoted"))?;

        let mut value = String::new();
        let mut chars = rest.char_indices();
        let end = loop {
            match chars.next() {
                Some((i, '"')) => break i,
                Some((_, '\\')) => match chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, c)) => value.push(c),
                    None => return Err(format!("unterminated value for label '{name}'")),
                },
                Some((_, c)) => value.push(c),
                None => return Err(format!("unterminated value for label '{name}'")),
            }
        };
        if labels.insert(name.to_string(), value).is_some() {
            return Err(format!("duplicate label '{name}'"));
        }

        rest = rest[end + 1..].trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after;
        } else if !rest.starts_with('}') {
            return Err("expected ',' or '}' after label".to_string());
        }
    }
}

fn unescape_help(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}
