//! Validation-gated submission.
//!
//! [`SubmissionController::request_submit`] validates, decides and runs the
//! success action as one step. The action only runs when the error map
//! produced by that same validation pass is empty, and `pending` stays set for
//! as long as the action is running so a second submit cannot fire it again.

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use futures::{future::BoxFuture, FutureExt};
use tracing::debug;

use crate::{
    error::FormError,
    validation::{FieldErrors, FieldValues, FormSchema, Validator},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormState<F: FormSchema> {
    pub values: FieldValues<F>,
    pub errors: FieldErrors<F>,
    pub pending: bool,
}

/// Shared handle on one form's state.
#[derive(Debug)]
pub struct FormStore<F: FormSchema> {
    inner: Arc<Mutex<FormState<F>>>,
}

impl<F: FormSchema> Clone for FormStore<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F: FormSchema> FormStore<F> {
    pub fn new(values: FieldValues<F>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(FormState {
                values,
                errors: FieldErrors::new(),
                pending: false,
            })),
        }
    }

    pub fn blank() -> Self {
        Self::new(F::blank_values())
    }

    fn lock(&self) -> MutexGuard<'_, FormState<F>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> FormState<F> {
        self.lock().clone()
    }

    pub fn values(&self) -> FieldValues<F> {
        self.lock().values.clone()
    }

    pub fn value(&self, field: F) -> String {
        self.lock().values.get(&field).cloned().unwrap_or_default()
    }

    pub fn errors(&self) -> FieldErrors<F> {
        self.lock().errors.clone()
    }

    pub fn error(&self, field: F) -> Option<String> {
        self.lock().errors.get(&field).cloned()
    }

    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }
}

/// Stand-in for a form submit event from the presentation layer.
#[derive(Debug, Default)]
pub struct SubmitEvent {
    default_prevented: bool,
}

impl SubmitEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prevent_default(&mut self) {
        self.default_prevented = true;
    }

    pub fn is_default_prevented(&self) -> bool {
        self.default_prevented
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome<F: FormSchema> {
    /// Validation passed and the success action ran to completion.
    Submitted,
    /// Validation failed; the errors are also stored on the form.
    Rejected(FieldErrors<F>),
    /// A previous submit is still running its action.
    AlreadyPending,
}

type SuccessAction = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Clears `pending` even when the action panics or its future is dropped.
struct PendingGuard<F: FormSchema> {
    form: FormStore<F>,
}

impl<F: FormSchema> Drop for PendingGuard<F> {
    fn drop(&mut self) {
        self.form.lock().pending = false;
    }
}

pub struct SubmissionController<F: FormSchema> {
    form: FormStore<F>,
    validator: Validator<F>,
    on_success: SuccessAction,
}

impl<F: FormSchema> SubmissionController<F> {
    /// `action` is invoked with no arguments and its output is discarded.
    pub fn new<A, Fut>(form: FormStore<F>, validator: Validator<F>, action: A) -> Self
    where
        A: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
    {
        Self {
            form,
            validator,
            on_success: Box::new(move || {
                let fut = action();
                async move {
                    let _ = fut.await;
                }
                .boxed()
            }),
        }
    }

    pub fn form(&self) -> &FormStore<F> {
        &self.form
    }

    pub fn set_field(&self, field: F, value: impl Into<String>) {
        self.form.lock().values.insert(field, value.into());
    }

    /// Replaces the error map wholesale with the validator's result.
    pub fn validate_now(&self) -> FieldErrors<F> {
        let mut state = self.form.lock();
        let errors = (self.validator)(&state.values);
        state.errors = errors.clone();
        errors
    }

    pub fn blur(&self, field: F) -> FieldErrors<F> {
        debug!(field = field.name(), "field blurred");
        self.validate_now()
    }

    pub async fn request_submit(&self) -> SubmitOutcome<F> {
        let guard = {
            let mut state = self.form.lock();
            if state.pending {
                debug!("submit ignored while a previous submit is pending");
                return SubmitOutcome::AlreadyPending;
            }

            let errors = (self.validator)(&state.values);
            state.errors = errors.clone();
            if !errors.is_empty() {
                debug!(errors = errors.len(), "submit rejected by validation");
                return SubmitOutcome::Rejected(errors);
            }

            state.pending = true;
            PendingGuard {
                form: self.form.clone(),
            }
        };

        (self.on_success)().await;
        drop(guard);
        SubmitOutcome::Submitted
    }

    pub fn on_field_change(&self, name: &str, value: impl Into<String>) -> Result<(), FormError> {
        let field = F::from_name(name).ok_or_else(|| FormError::UnknownField(name.to_string()))?;
        self.set_field(field, value);
        Ok(())
    }

    pub fn on_blur(&self, name: &str) -> Result<FieldErrors<F>, FormError> {
        let field = F::from_name(name).ok_or_else(|| FormError::UnknownField(name.to_string()))?;
        Ok(self.blur(field))
    }

    pub async fn on_submit(&self, event: &mut SubmitEvent) -> SubmitOutcome<F> {
        event.prevent_default();
        self.request_submit().await
    }
}

#[cfg(test)]
#[path = "tests/form_tests.rs"]
mod tests;
