use crate::config::Config;
use crate::exam::ExamService;
use axum::extract::FromRef;

#[derive(Clone)]
pub struct AppState {
    pub exams: ExamService,
    pub config: Config,
}

impl FromRef<AppState> for ExamService {
    fn from_ref(state: &AppState) -> Self {
        state.exams.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
