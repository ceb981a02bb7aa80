//! Per-language overlays stored in the `i18n` column.
//!
//! The column holds JSON shaped `{"<lang>": {"<field>": value}}`. Missing
//! or malformed JSON reads as "no translations".

use super::Record;
use crate::model::value::{FieldMap, FieldValue};
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

/// Column carrying the localisation JSON.
pub const I18N_FIELD: &str = "i18n";

/// Language code -> translated fields.
pub type Localisations = BTreeMap<String, FieldMap>;

/// Translation coverage of one language.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocalisationDigest {
    pub language: String,
    pub translated: Vec<String>,
    pub untranslated: Vec<String>,
}

/// Decodes an `i18n` column value.
pub fn decode_localisations(raw: &FieldValue) -> Localisations {
    let text = raw.to_text();
    if text.trim().is_empty() {
        return Localisations::new();
    }
    serde_json::from_str(&text).unwrap_or_else(|err| {
        debug!("event=i18n_decode module=record status=error error={err}");
        Localisations::new()
    })
}

/// Working field holding the decoded `i18n` map.
pub const DECODED_I18N_FIELD: &str = "_i18n_";

/// Overlays `lang_code` translations from `data["i18n"]` onto `data`.
///
/// The column is decoded once into `data["_i18n_"]`; later calls reuse it.
/// Every translated pair is written, including fields the row lacks. An
/// empty `lang_code` only decodes.
pub fn translate_data(data: &mut FieldMap, lang_code: &str) {
    if !data.contains_key(DECODED_I18N_FIELD) {
        let Some(raw) = data.get(I18N_FIELD) else {
            return;
        };
        let decoded = localisations_value(decode_localisations(raw));
        data.insert(DECODED_I18N_FIELD.to_string(), decoded);
    }
    if lang_code.is_empty() {
        return;
    }
    let overlay = data
        .get(DECODED_I18N_FIELD)
        .and_then(FieldValue::as_map)
        .and_then(|languages| languages.get(lang_code))
        .and_then(FieldValue::as_map)
        .cloned();
    if let Some(overlay) = overlay {
        data.extend(overlay);
    }
}

fn localisations_value(localisations: Localisations) -> FieldValue {
    FieldValue::Map(
        localisations
            .into_iter()
            .map(|(language, fields)| (language, FieldValue::Map(fields)))
            .collect(),
    )
}

fn is_blank(value: &FieldValue) -> bool {
    match value {
        FieldValue::Null => true,
        FieldValue::Text(text) => text.trim().is_empty(),
        _ => false,
    }
}

impl Record<'_> {
    /// All decoded translations, memoized until the data changes.
    pub fn get_localisations(&self) -> &Localisations {
        self.localisations
            .get_or_init(|| self.get(I18N_FIELD).map(decode_localisations).unwrap_or_default())
    }

    /// Translations for the session language.
    pub fn get_current_localisation(&self) -> FieldMap {
        self.get_localisations()
            .get(&self.ctx.session.language)
            .cloned()
            .unwrap_or_default()
    }

    /// Data with `lang_code` translations applied; the record is unchanged.
    ///
    /// The copy carries the decoded map under `_i18n_`, reflecting any
    /// pending `i18n` change.
    pub fn translated_data(&self, lang_code: &str) -> FieldMap {
        let mut data = self.data.clone();
        if self.is_localisable() {
            data.insert(
                DECODED_I18N_FIELD.to_string(),
                localisations_value(self.get_localisations().clone()),
            );
        }
        translate_data(&mut data, lang_code);
        data
    }

    /// Each language's fields, split by whether the value is non-blank.
    pub fn get_localisation_digest(&self) -> Vec<LocalisationDigest> {
        self.get_localisations()
            .iter()
            .map(|(language, values)| {
                let (translated, untranslated): (Vec<String>, Vec<String>) = values
                    .keys()
                    .cloned()
                    .partition(|field| values.get(field).is_some_and(|value| !is_blank(value)));
                LocalisationDigest {
                    language: language.clone(),
                    translated,
                    untranslated,
                }
            })
            .collect()
    }
}
