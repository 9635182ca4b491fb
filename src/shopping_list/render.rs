use crate::{
    constants::{LIST_FORMATS, SHOPPING_LIST_TITLE},
    error::{ShoppingListError, TypeError},
    schema::ShoppingListEntry,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListFormat {
    /// `name, total unit` per line.
    #[default]
    Plain,
    /// Titled list of `<i> name - total, unit` lines.
    Numbered,
}

impl ListFormat {
    pub fn key(&self) -> &'static str {
        match self {
            ListFormat::Plain => LIST_FORMATS[0].0,
            ListFormat::Numbered => LIST_FORMATS[1].0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ListFormat::Plain => LIST_FORMATS[0].1,
            ListFormat::Numbered => LIST_FORMATS[1].1,
        }
    }

    /// Reads the `format` query parameter; absent means plain text.
    pub fn from_query(value: Option<&str>) -> Result<Self, TypeError> {
        match value {
            Some(value) => Self::try_from(value),
            None => Ok(Self::default()),
        }
    }
}

impl TryFrom<&str> for ListFormat {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let value = value.trim().to_lowercase();
        [ListFormat::Plain, ListFormat::Numbered]
            .into_iter()
            .find(|format| format.key() == value)
            .ok_or_else(|| TypeError::new("Invalid list format"))
    }
}

/// Renders a shopping list document. Refuses to render an empty list.
pub fn render_shopping_list(
    entries: &[ShoppingListEntry],
    format: ListFormat,
) -> Result<String, ShoppingListError> {
    if entries.is_empty() {
        return Err(ShoppingListError::EmptyCart);
    }

    let mut document = String::new();
    match format {
        ListFormat::Plain => {
            for entry in entries {
                document.push_str(&format!(
                    "{}, {} {}\n",
                    entry.name, entry.total_amount, entry.measurement_unit
                ));
            }
        }
        ListFormat::Numbered => {
            document.push_str(&format!("{SHOPPING_LIST_TITLE}\n"));
            for (i, entry) in entries.iter().enumerate() {
                document.push_str(&format!(
                    "<{}> {} - {}, {}\n",
                    i + 1,
                    entry.name,
                    entry.total_amount,
                    entry.measurement_unit
                ));
            }
        }
    }

    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<ShoppingListEntry> {
        vec![
            ShoppingListEntry {
                ingredient_id: 1,
                name: String::from("eggs"),
                measurement_unit: String::from("pcs"),
                total_amount: 5,
            },
            ShoppingListEntry {
                ingredient_id: 2,
                name: String::from("flour"),
                measurement_unit: String::from("g"),
                total_amount: 100,
            },
        ]
    }

    #[test]
    fn plain_lists_one_ingredient_per_line() {
        let document = render_shopping_list(&entries(), ListFormat::Plain).unwrap();

        assert_eq!(document, "eggs, 5 pcs\nflour, 100 g\n");
    }

    #[test]
    fn numbered_list_has_a_title() {
        let document = render_shopping_list(&entries(), ListFormat::Numbered).unwrap();

        assert_eq!(
            document,
            "Список ингредиентов\n<1> eggs - 5, pcs\n<2> flour - 100, g\n"
        );
    }

    #[test]
    fn empty_list_is_not_rendered() {
        assert!(matches!(
            render_shopping_list(&[], ListFormat::Numbered),
            Err(ShoppingListError::EmptyCart)
        ));
    }

    #[test]
    fn formats_parse_from_query() {
        assert_eq!(ListFormat::from_query(None), Ok(ListFormat::Plain));
        assert_eq!(
            ListFormat::from_query(Some("Numbered")),
            Ok(ListFormat::Numbered)
        );
        assert!(ListFormat::from_query(Some("pdf")).is_err());
        assert_eq!(ListFormat::Numbered.key(), "numbered");
        assert_eq!(ListFormat::Plain.label(), "Plain text");
    }
}
