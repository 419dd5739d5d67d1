//! Forms wired to their domain actions: sign in, create account, submit a
//! new catalog entry, and the vote/comment page of one entry.

use std::{
    collections::BTreeSet,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::Utc;
use shared::{
    domain::{Creator, EntityId, NewEntity},
    store::{AuthProvider, RemoteEntityStore},
};
use tracing::{error, info, warn};

use crate::{
    error::ClientError,
    fetch::{EntityFetchStateMachine, FetchState},
    form::{FormStore, SubmissionController, SubmitOutcome},
    mutation::{MutationOutcome, OptimisticMutationCoordinator},
    upload::ImageUpload,
    validation::{
        validate_account, validate_comment, validate_login, validate_new_entity, AccountField,
        CommentField, EntityField, FormSchema, LoginField, Validator,
    },
};

/// Where the presentation layer should go next. The core never navigates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Home,
    Login,
}

#[derive(Debug, Default)]
struct FlowState {
    form_error: Option<String>,
    navigation: Option<Navigation>,
    created: Option<EntityId>,
}

#[derive(Debug, Clone, Default)]
struct FlowStatus {
    inner: Arc<Mutex<FlowState>>,
}

impl FlowStatus {
    fn lock(&self) -> MutexGuard<'_, FlowState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_error(&self, message: impl Into<String>) {
        self.lock().form_error = Some(message.into());
    }

    fn clear_error(&self) {
        self.lock().form_error = None;
    }

    fn navigate(&self, to: Navigation) {
        self.lock().navigation = Some(to);
    }
}

/// A submission controller plus the form-level outcome of its action.
pub struct GatedForm<F: FormSchema> {
    controller: SubmissionController<F>,
    status: FlowStatus,
}

impl<F: FormSchema> GatedForm<F> {
    fn build<A, Fut>(
        validator: Validator<F>,
        make_action: impl FnOnce(FormStore<F>, FlowStatus) -> A,
    ) -> Self
    where
        A: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future + Send + 'static,
    {
        let form = FormStore::blank();
        let status = FlowStatus::default();
        let action = make_action(form.clone(), status.clone());
        Self {
            controller: SubmissionController::new(form, validator, action),
            status,
        }
    }

    pub fn controller(&self) -> &SubmissionController<F> {
        &self.controller
    }

    pub fn form(&self) -> &FormStore<F> {
        self.controller.form()
    }

    pub async fn submit(&self) -> SubmitOutcome<F> {
        self.controller.request_submit().await
    }

    /// Form-level message, e.g. an authentication failure.
    pub fn form_error(&self) -> Option<String> {
        self.status.lock().form_error.clone()
    }

    pub fn take_navigation(&self) -> Option<Navigation> {
        self.status.lock().navigation.take()
    }

    pub fn created(&self) -> Option<EntityId> {
        self.status.lock().created.clone()
    }
}

pub type LoginForm = GatedForm<LoginField>;
pub type AccountForm = GatedForm<AccountField>;
pub type NewEntityForm = GatedForm<EntityField>;
pub type CommentForm = GatedForm<CommentField>;

pub fn login_form(auth: Arc<dyn AuthProvider>) -> LoginForm {
    GatedForm::build(validate_login, move |form, status| {
        move || {
            let form = form.clone();
            let status = status.clone();
            let auth = Arc::clone(&auth);
            async move {
                status.clear_error();
                let email = form.value(LoginField::Email);
                let password = form.value(LoginField::Password);
                match auth.login(email.trim(), &password).await {
                    Ok(user) => {
                        info!(user_id = %user.uid, "login form accepted");
                        status.navigate(Navigation::Home);
                    }
                    Err(err) => {
                        warn!(error = %err, "login form rejected");
                        status.set_error(err.message);
                    }
                }
            }
        }
    })
}

pub fn account_form(auth: Arc<dyn AuthProvider>) -> AccountForm {
    GatedForm::build(validate_account, move |form, status| {
        move || {
            let form = form.clone();
            let status = status.clone();
            let auth = Arc::clone(&auth);
            async move {
                status.clear_error();
                let name = form.value(AccountField::Name);
                let email = form.value(AccountField::Email);
                let password = form.value(AccountField::Password);
                match auth.register(name.trim(), email.trim(), &password).await {
                    Ok(user) => {
                        info!(user_id = %user.uid, "account form accepted");
                        status.navigate(Navigation::Home);
                    }
                    Err(err) => {
                        warn!(error = %err, "account form rejected");
                        status.set_error(err.message);
                    }
                }
            }
        }
    })
}

pub fn new_entity_form(
    store: Arc<dyn RemoteEntityStore>,
    auth: Arc<dyn AuthProvider>,
    collection: impl Into<String>,
    upload: ImageUpload,
) -> NewEntityForm {
    let collection = collection.into();
    GatedForm::build(validate_new_entity, move |form, status| {
        move || {
            let form = form.clone();
            let status = status.clone();
            let store = Arc::clone(&store);
            let auth = Arc::clone(&auth);
            let collection = collection.clone();
            let image_url = upload.image_url();
            async move {
                status.clear_error();
                let Some(user) = auth.current_user().await else {
                    info!("new entry requires a signed-in user");
                    status.navigate(Navigation::Login);
                    return;
                };

                let field = |f: EntityField| form.value(f).trim().to_string();
                let record = NewEntity {
                    name: field(EntityField::Name),
                    company: field(EntityField::Company),
                    url: field(EntityField::Url),
                    description: field(EntityField::Description),
                    image_url,
                    votes: 0,
                    voters: BTreeSet::new(),
                    comments: Vec::new(),
                    created_at: Utc::now(),
                    creator: Creator::from(&user),
                };

                match store.create(&collection, record).await {
                    Ok(id) => {
                        info!(entity_id = %id, %collection, "entry created");
                        status.lock().created = Some(id);
                        status.navigate(Navigation::Home);
                    }
                    Err(err) => {
                        error!(error = %err, %collection, "failed to create entry");
                        status.set_error("No se pudo crear el producto, inténtalo de nuevo");
                    }
                }
            }
        }
    })
}

/// Detail view of one entry: its fetch state, voting and the comment form.
pub struct EntityPage {
    view: Arc<tokio::sync::Mutex<EntityFetchStateMachine>>,
    store: Arc<dyn RemoteEntityStore>,
    coordinator: Arc<OptimisticMutationCoordinator>,
    comment_form: CommentForm,
    status: FlowStatus,
}

impl EntityPage {
    pub fn new(
        store: Arc<dyn RemoteEntityStore>,
        coordinator: Arc<OptimisticMutationCoordinator>,
        collection: impl Into<String>,
        id: EntityId,
    ) -> Self {
        let view = Arc::new(tokio::sync::Mutex::new(EntityFetchStateMachine::for_id(
            collection, id,
        )));

        let comment_form = {
            let view = Arc::clone(&view);
            let coordinator = Arc::clone(&coordinator);
            GatedForm::build(validate_comment, move |form, status| {
                move || {
                    let form = form.clone();
                    let status = status.clone();
                    let view = Arc::clone(&view);
                    let coordinator = Arc::clone(&coordinator);
                    async move {
                        status.clear_error();
                        let message = form.value(CommentField::Message);
                        let mut view = view.lock().await;
                        match coordinator.add_comment(&mut view, message.trim()).await {
                            Ok(MutationOutcome::LoginRequired) => status.navigate(Navigation::Login),
                            Ok(_) => {}
                            Err(err) => {
                                warn!(error = %err, "comment not saved");
                                status.set_error("No se pudo guardar tu comentario");
                            }
                        }
                    }
                }
            })
        };

        Self {
            view,
            store,
            coordinator,
            comment_form,
            status: FlowStatus::default(),
        }
    }

    /// Reads from the store when the view is new or dirty.
    pub async fn load(&self) -> FetchState {
        let mut view = self.view.lock().await;
        view.refresh(self.store.as_ref()).await.clone()
    }

    pub async fn state(&self) -> FetchState {
        self.view.lock().await.state().clone()
    }

    pub async fn is_dirty(&self) -> bool {
        self.view.lock().await.is_dirty()
    }

    pub async fn retry(&self) {
        self.view.lock().await.retry();
    }

    /// A signed-out vote also requests [`Navigation::Login`].
    pub async fn vote(&self) -> Result<MutationOutcome, ClientError> {
        let mut view = self.view.lock().await;
        let outcome = self.coordinator.cast_vote(&mut view).await?;
        if outcome == MutationOutcome::LoginRequired {
            self.status.navigate(Navigation::Login);
        }
        Ok(outcome)
    }

    pub fn take_navigation(&self) -> Option<Navigation> {
        self.status.lock().navigation.take()
    }

    pub fn comment_form(&self) -> &CommentForm {
        &self.comment_form
    }

    pub async fn unmount(&self) {
        self.view.lock().await.unmount();
    }
}

#[cfg(test)]
#[path = "tests/flows_tests.rs"]
mod tests;
