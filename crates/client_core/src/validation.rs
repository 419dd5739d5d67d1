//! Form schemas and the validators bound to them.
//!
//! A validator is a plain `fn` pointer: it gets the full set of current values
//! and returns the complete error map. Keys it does not return are valid.

use std::{collections::HashMap, fmt::Debug, hash::Hash};

use url::Url;

pub type FieldValues<F> = HashMap<F, String>;
pub type FieldErrors<F> = HashMap<F, String>;
pub type Validator<F> = fn(&FieldValues<F>) -> FieldErrors<F>;

pub const MIN_PASSWORD_LEN: usize = 6;

/// Closed set of field names for one form.
pub trait FormSchema: Copy + Eq + Hash + Debug + Send + Sync + 'static {
    const FIELDS: &'static [Self];

    fn name(self) -> &'static str;

    fn from_name(name: &str) -> Option<Self> {
        Self::FIELDS.iter().copied().find(|field| field.name() == name)
    }

    fn blank_values() -> FieldValues<Self> {
        Self::FIELDS
            .iter()
            .map(|field| (*field, String::new()))
            .collect()
    }
}

macro_rules! form_schema {
    ($name:ident { $($variant:ident => $field:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($variant),+
        }

        impl FormSchema for $name {
            const FIELDS: &'static [Self] = &[$(Self::$variant),+];

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $field),+
                }
            }
        }
    };
}

form_schema!(LoginField {
    Email => "email",
    Password => "password",
});

form_schema!(AccountField {
    Name => "nombre",
    Email => "email",
    Password => "password",
});

form_schema!(EntityField {
    Name => "nombre",
    Company => "empresa",
    Url => "url",
    Description => "descripcion",
});

form_schema!(CommentField {
    Message => "mensaje",
});

fn value<F: FormSchema>(values: &FieldValues<F>, field: F) -> &str {
    values.get(&field).map(|v| v.trim()).unwrap_or_default()
}

pub fn is_email(candidate: &str) -> bool {
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !candidate.chars().any(char::is_whitespace)
}

pub fn is_http_url(candidate: &str) -> bool {
    match Url::parse(candidate) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

fn check_email<F: FormSchema>(values: &FieldValues<F>, field: F, errors: &mut FieldErrors<F>) {
    let email = value(values, field);
    if email.is_empty() {
        errors.insert(field, "Email requerido".into());
    } else if !is_email(email) {
        errors.insert(field, "Email no válido".into());
    }
}

fn check_password<F: FormSchema>(
    values: &FieldValues<F>,
    field: F,
    errors: &mut FieldErrors<F>,
) {
    // Passwords are not trimmed.
    let password = values.get(&field).map(String::as_str).unwrap_or_default();
    if password.is_empty() {
        errors.insert(field, "Password requerido".into());
    } else if password.chars().count() < MIN_PASSWORD_LEN {
        errors.insert(
            field,
            format!("El password debe ser de al menos {MIN_PASSWORD_LEN} caracteres"),
        );
    }
}

pub fn validate_login(values: &FieldValues<LoginField>) -> FieldErrors<LoginField> {
    let mut errors = FieldErrors::new();
    check_email(values, LoginField::Email, &mut errors);
    check_password(values, LoginField::Password, &mut errors);
    errors
}

pub fn validate_account(values: &FieldValues<AccountField>) -> FieldErrors<AccountField> {
    let mut errors = FieldErrors::new();
    if value(values, AccountField::Name).is_empty() {
        errors.insert(AccountField::Name, "Nombre requerido".into());
    }
    check_email(values, AccountField::Email, &mut errors);
    check_password(values, AccountField::Password, &mut errors);
    errors
}

pub fn validate_new_entity(values: &FieldValues<EntityField>) -> FieldErrors<EntityField> {
    let mut errors = FieldErrors::new();
    if value(values, EntityField::Name).is_empty() {
        errors.insert(EntityField::Name, "Nombre requerido".into());
    }
    if value(values, EntityField::Company).is_empty() {
        errors.insert(EntityField::Company, "Empresa requerida".into());
    }
    let url = value(values, EntityField::Url);
    if url.is_empty() {
        errors.insert(EntityField::Url, "URL requerida".into());
    } else if !is_http_url(url) {
        errors.insert(EntityField::Url, "URL mal formateada o no válida".into());
    }
    if value(values, EntityField::Description).is_empty() {
        errors.insert(
            EntityField::Description,
            "Agrega una descripción de tu producto".into(),
        );
    }
    errors
}

pub fn validate_comment(values: &FieldValues<CommentField>) -> FieldErrors<CommentField> {
    let mut errors = FieldErrors::new();
    if value(values, CommentField::Message).is_empty() {
        errors.insert(CommentField::Message, "Mensaje requerido".into());
    }
    errors
}
