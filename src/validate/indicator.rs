//! Indicator: one aggregated measure grouped by zero or more dimensions.

use super::upstream::{Upstream, single_input};
use super::{
    Checked, find_field, has_duplicate_alias, has_duplicate_identity, refresh_ref, type_changed,
};
use crate::parse::types::*;

pub fn check(
    node: &FusionNode,
    formula: &Formula,
    config: &IndicatorConfig,
    upstream: &Upstream<'_>,
) -> Result<Checked, FormulaError> {
    let input = single_input(node, upstream)?;

    let measure = config.measure.as_ref().ok_or(FormulaError::ConfigError)?;
    let measure_ref = measure.field.as_ref().ok_or(FormulaError::ConfigError)?;
    let measure_live = find_field(&input, measure_ref).ok_or(FormulaError::ConfigError)?;
    if type_changed(measure_ref, measure_live) {
        return Err(FormulaError::ConfigError);
    }
    if matches!(measure.aggregate, Aggregate::Sum | Aggregate::Avg)
        && !measure_live.data_type.is_numeric()
    {
        return Err(FormulaError::ConfigError);
    }

    let mut output = Vec::with_capacity(config.group.len() + 1);
    let mut group = Vec::with_capacity(config.group.len());
    for g in &config.group {
        let live = find_field(&input, &g.field).ok_or(FormulaError::ConfigError)?;
        // Moving in or out of the date family invalidates the format choice.
        if g.field
            .data_type
            .is_some_and(|saved| saved.is_date_like() != live.data_type.is_date_like())
        {
            return Err(FormulaError::ConfigError);
        }
        let refreshed = refresh_ref(&g.field, live);
        output.push(group_output(formula, g.format, &refreshed, live));
        group.push(GroupConfig {
            field: refreshed,
            format: g.format,
        });
    }

    output.push(measure_output(formula, measure, measure_live));
    if has_duplicate_alias(&output) || has_duplicate_identity(&output) {
        return Err(FormulaError::ConfigError);
    }

    Ok(Checked {
        output,
        config: Some(OperatorConfig::Indicator(IndicatorConfig {
            measure: Some(MeasureConfig {
                field: Some(refresh_ref(measure_ref, measure_live)),
                ..measure.clone()
            }),
            group,
        })),
    })
}

/// A plain dimension keeps the upstream identity. A formatted one is a new
/// column of this operator (`{id}_{format}`), so one date can be grouped by
/// several formats. Date-like dimensions leave as text.
fn group_output(formula: &Formula, format: Option<DateFormat>, r: &FieldRef, live: &Field) -> Field {
    let alias = r.alias.clone().unwrap_or_else(|| live.alias.clone());
    let data_type = if live.data_type.is_date_like() {
        DataType::Char
    } else {
        live.data_type
    };
    match format {
        Some(format) => Field {
            id: format!("{}_{}", live.id, format.as_str()),
            source_id: formula.id.clone(),
            alias,
            data_type,
            ..live.clone()
        },
        None => Field {
            alias,
            data_type,
            ..live.clone()
        },
    }
}

fn measure_output(formula: &Formula, measure: &MeasureConfig, live: &Field) -> Field {
    let agg = measure.aggregate.as_str();
    let data_type = match measure.aggregate {
        Aggregate::Count | Aggregate::CountDistinct => DataType::Int,
        Aggregate::Sum | Aggregate::Avg => DataType::Number,
        Aggregate::Max | Aggregate::Min => live.data_type,
    };
    let alias = measure
        .alias
        .clone()
        .filter(|a| !a.is_empty())
        .unwrap_or_else(|| format!("{}_{}", agg, live.alias));
    Field {
        name_en: live.name_en.as_ref().map(|n| format!("{}_{}", agg, n)),
        ..Field::new(format!("{}_{}", agg, live.id), formula.id.as_str(), alias, data_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> FusionNode {
        let mut n = FusionNode::new("n", "n");
        n.src = vec!["a".into()];
        n
    }

    fn measure(field: &Field, aggregate: Aggregate) -> Option<MeasureConfig> {
        Some(MeasureConfig {
            field: Some(field.to_ref()),
            aggregate,
            alias: None,
        })
    }

    #[test]
    fn sum_requires_numeric_measure() {
        let name = Field::new("name", "form1", "name", DataType::Char);
        let input = vec![name.clone()];
        let formula = Formula::new("ind", OperatorKind::Indicator);
        let config = IndicatorConfig {
            measure: measure(&name, Aggregate::Sum),
            group: vec![],
        };
        let result = check(&node(), &formula, &config, &Upstream::Previous(&input));
        assert_eq!(result.err(), Some(FormulaError::ConfigError));
    }

    #[test]
    fn date_family_change_is_tolerated() {
        let saved = Field::new("day", "form1", "day", DataType::Date);
        let live = Field::new("day", "form1", "day", DataType::Timestamp);
        let amount = Field::new("amount", "form1", "amount", DataType::Float);
        let input = vec![live, amount.clone()];
        let formula = Formula::new("ind", OperatorKind::Indicator);
        let config = IndicatorConfig {
            measure: measure(&amount, Aggregate::Avg),
            group: vec![GroupConfig {
                field: saved.to_ref(),
                format: Some(DateFormat::Month),
            }],
        };

        let checked = check(&node(), &formula, &config, &Upstream::Previous(&input)).unwrap();
        assert_eq!(checked.output[0].data_type, DataType::Char);
        assert_eq!(checked.output[1].id, "avg_amount");
        assert_eq!(checked.output[1].source_id, "ind");
        assert_eq!(checked.output[1].data_type, DataType::Number);
        let Some(OperatorConfig::Indicator(refreshed)) = checked.config else {
            panic!("indicator config expected");
        };
        assert_eq!(refreshed.group[0].field.data_type, Some(DataType::Timestamp));
    }

    #[test]
    fn one_date_grouped_by_two_formats() {
        let day = Field::new("day", "form1", "day", DataType::Date);
        let amount = Field::new("amount", "form1", "amount", DataType::Float);
        let input = vec![day.clone(), amount.clone()];
        let formula = Formula::new("ind", OperatorKind::Indicator);
        let grouped = |alias: &str, format| GroupConfig {
            field: FieldRef {
                alias: Some(alias.into()),
                ..day.to_ref()
            },
            format: Some(format),
        };
        let mut config = IndicatorConfig {
            measure: measure(&amount, Aggregate::Sum),
            group: vec![grouped("y", DateFormat::Year), grouped("m", DateFormat::Month)],
        };

        let checked = check(&node(), &formula, &config, &Upstream::Previous(&input)).unwrap();
        let ids: Vec<(&str, &str)> = checked
            .output
            .iter()
            .map(|f| (f.id.as_str(), f.source_id.as_str()))
            .collect();
        assert_eq!(ids, vec![("day_year", "ind"), ("day_month", "ind"), ("sum_amount", "ind")]);

        config.group[1].format = Some(DateFormat::Year);
        let result = check(&node(), &formula, &config, &Upstream::Previous(&input));
        assert_eq!(result.err(), Some(FormulaError::ConfigError));
    }

    #[test]
    fn leaving_date_family_is_config_error() {
        let saved = Field::new("day", "form1", "day", DataType::Date);
        let live = Field::new("day", "form1", "day", DataType::Char);
        let input = vec![live.clone()];
        let formula = Formula::new("ind", OperatorKind::Indicator);
        let config = IndicatorConfig {
            measure: measure(&live, Aggregate::Count),
            group: vec![GroupConfig {
                field: saved.to_ref(),
                format: None,
            }],
        };
        let result = check(&node(), &formula, &config, &Upstream::Previous(&input));
        assert_eq!(result.err(), Some(FormulaError::ConfigError));
    }
}
