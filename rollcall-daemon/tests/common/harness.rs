//! Test harnesses for service and HTTP tests.
//!
//! Stores are real (file-backed in a temp dir); the LMS and the chat
//! platform are in-memory fakes that record every call.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use chrono::Utc;
use rollcall_core::{
    Course, Credential, Enrollment, GuildId, LmsCourseId, RoleId, Roster, Student, SubjectId,
};
use rollcall_daemon::config::RegistrationConfig;
use rollcall_daemon::http::{router, AppState};
use rollcall_daemon::lms::{CodeExchange, EnrollmentStream, LmsApi, LmsError};
use rollcall_daemon::roles::{MemberAccess, RoleGrantSink, RoleSinkError};
use rollcall_daemon::services::{
    OAuthSettings, RegistrationService, RequestRateLimiter, VerificationEngine,
};
use rollcall_daemon::store::{ConfigStore, FileConfigStore, FileHandshakeStore};
use tokio_stream::StreamExt;
use url::Url;

pub const PUBLIC_URL: &str = "https://verify.example.org/";
pub const SHARED_SECRET: &str = "test-shared-secret";
pub const MEMBER_ACCESS_TOKEN: &str = "member-access-token";

pub fn enrollment(course: &str, login: &str, name: &str) -> Enrollment {
    Enrollment {
        course_id: LmsCourseId::new(course),
        external_id: login.to_string(),
        name: name.to_string(),
    }
}

/// In-memory LMS.
#[derive(Default)]
pub struct FakeLms {
    /// Served by `fetch_enrollments`.
    pub roster: Mutex<Vec<Enrollment>>,
    /// Served by `fetch_own_enrollments`.
    pub own: Mutex<Vec<Enrollment>>,
    pub fail_exchange: AtomicBool,
    pub fail_listing: AtomicBool,
    pub exchange_calls: AtomicUsize,
    pub roster_calls: AtomicUsize,
    pub own_calls: AtomicUsize,
    /// Enrollments actually pulled from any stream.
    pub yielded: AtomicUsize,
    pub last_redirect_uri: Mutex<Option<String>>,
}

impl FakeLms {
    pub fn set_roster(&self, enrollments: Vec<Enrollment>) {
        *self.roster.lock().unwrap() = enrollments;
    }

    pub fn set_own(&self, enrollments: Vec<Enrollment>) {
        *self.own.lock().unwrap() = enrollments;
    }

    fn serve<'a>(&'a self, items: Vec<Enrollment>) -> EnrollmentStream<'a> {
        if self.fail_listing.load(Ordering::SeqCst) {
            return Box::pin(tokio_stream::iter(vec![Err(LmsError::Status { status: 503 })]));
        }
        Box::pin(tokio_stream::iter(items).map(move |e| {
            self.yielded.fetch_add(1, Ordering::SeqCst);
            Ok(e)
        }))
    }
}

#[async_trait]
impl LmsApi for FakeLms {
    async fn exchange_code(&self, exchange: &CodeExchange<'_>) -> Result<Credential, LmsError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_redirect_uri.lock().unwrap() = Some(exchange.redirect_uri.to_string());
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(LmsError::Timeout);
        }
        Ok(Credential::new(MEMBER_ACCESS_TOKEN))
    }

    fn fetch_enrollments<'a>(
        &'a self,
        _credential: &'a Credential,
        _course_id: &'a LmsCourseId,
    ) -> EnrollmentStream<'a> {
        self.roster_calls.fetch_add(1, Ordering::SeqCst);
        let items = self.roster.lock().unwrap().clone();
        self.serve(items)
    }

    fn fetch_own_enrollments<'a>(&'a self, credential: &'a Credential) -> EnrollmentStream<'a> {
        assert_eq!(credential.expose(), MEMBER_ACCESS_TOKEN);
        self.own_calls.fetch_add(1, Ordering::SeqCst);
        let items = self.own.lock().unwrap().clone();
        self.serve(items)
    }

    fn authorize_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        state: &str,
    ) -> Result<Url, LmsError> {
        let mut url = Url::parse("https://lms.test/login/oauth2/auth").unwrap();
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state);
        Ok(url)
    }
}

/// Chat platform fake recording grants and nickname changes.
#[derive(Default)]
pub struct RecordingRoleSink {
    pub current_roles: Mutex<Vec<RoleId>>,
    /// Reported by `member_access`.
    pub administrator: AtomicBool,
    /// Calls to `member_roles` and `member_access`.
    pub lookups: AtomicUsize,
    pub grants: Mutex<Vec<(GuildId, SubjectId, RoleId)>>,
    pub nicknames: Mutex<Vec<(GuildId, SubjectId, String)>>,
    pub fail_roles_lookup: AtomicBool,
    pub fail_grant: AtomicBool,
    pub fail_nickname: AtomicBool,
}

impl RecordingRoleSink {
    pub fn grant_count(&self) -> usize {
        self.grants.lock().unwrap().len()
    }

    pub fn nickname_count(&self) -> usize {
        self.nicknames.lock().unwrap().len()
    }
}

#[async_trait]
impl RoleGrantSink for RecordingRoleSink {
    async fn member_roles(
        &self,
        _guild_id: &GuildId,
        _subject_id: &SubjectId,
    ) -> Result<Vec<RoleId>, RoleSinkError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_roles_lookup.load(Ordering::SeqCst) {
            return Err(RoleSinkError::Status { status: 500 });
        }
        Ok(self.current_roles.lock().unwrap().clone())
    }

    async fn member_access(
        &self,
        guild_id: &GuildId,
        subject_id: &SubjectId,
    ) -> Result<MemberAccess, RoleSinkError> {
        let role_ids = self.member_roles(guild_id, subject_id).await?;
        Ok(MemberAccess {
            role_ids,
            is_administrator: self.administrator.load(Ordering::SeqCst),
        })
    }

    async fn grant_role(
        &self,
        guild_id: &GuildId,
        subject_id: &SubjectId,
        role_id: &RoleId,
    ) -> Result<(), RoleSinkError> {
        if self.fail_grant.load(Ordering::SeqCst) {
            return Err(RoleSinkError::Status { status: 403 });
        }
        self.grants
            .lock()
            .unwrap()
            .push((guild_id.clone(), subject_id.clone(), role_id.clone()));
        Ok(())
    }

    async fn set_display_name(
        &self,
        guild_id: &GuildId,
        subject_id: &SubjectId,
        display_name: &str,
    ) -> Result<(), RoleSinkError> {
        if self.fail_nickname.load(Ordering::SeqCst) {
            return Err(RoleSinkError::Status { status: 403 });
        }
        self.nicknames.lock().unwrap().push((
            guild_id.clone(),
            subject_id.clone(),
            display_name.to_string(),
        ));
        Ok(())
    }
}

/// Real stores in a temp dir wired to fake collaborators.
pub struct TestEnv {
    pub dir: tempfile::TempDir,
    pub courses: Arc<FileConfigStore>,
    pub handshakes: Arc<FileHandshakeStore>,
    pub lms: Arc<FakeLms>,
    pub roles: Arc<RecordingRoleSink>,
    pub engine: VerificationEngine,
    pub registration: RegistrationService,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_registration(RegistrationConfig::default())
    }

    pub fn with_registration(registration: RegistrationConfig) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let courses = Arc::new(FileConfigStore::new(dir.path().join("courses.json")));
        let handshakes = Arc::new(FileHandshakeStore::new(
            dir.path().join("handshakes.json"),
            chrono::Duration::minutes(15),
        ));
        let lms = Arc::new(FakeLms::default());
        let roles = Arc::new(RecordingRoleSink::default());

        let engine = VerificationEngine::new(
            courses.clone(),
            handshakes.clone(),
            lms.clone(),
            roles.clone(),
            OAuthSettings {
                client_id: "10000000000001".to_string(),
                client_secret: Credential::new("lms-client-secret"),
                public_url: Url::parse(PUBLIC_URL).unwrap(),
            },
        );
        let registration = RegistrationService::new(
            courses.clone(),
            lms.clone(),
            roles.clone(),
            registration,
        );

        Self {
            dir,
            courses,
            handshakes,
            lms,
            roles,
            engine,
            registration,
        }
    }

    pub fn courses_path(&self) -> std::path::PathBuf {
        self.dir.path().join("courses.json")
    }

    /// Bind `guild` to course `course_id` with the given roster.
    pub async fn seed_course(
        &self,
        guild: &str,
        course_id: &str,
        role: &str,
        roster: &[(&str, &str)],
    ) {
        let course = Course {
            guild_id: GuildId::new(guild),
            lms_course_id: LmsCourseId::new(course_id),
            credential: Credential::new("course-credential"),
            authorized_role_id: RoleId::new(role),
            roster: roster
                .iter()
                .map(|(id, name)| Student {
                    external_id: id.to_string(),
                    display_name: name.to_string(),
                })
                .collect::<Roster>(),
            registered_at: Utc::now(),
        };
        self.courses.append(course).await.expect("Failed to seed course");
    }

    /// Router over this environment with a generous rate limit.
    pub fn app(&self) -> Router {
        self.app_with_limiter(RequestRateLimiter::new(1000, 1000))
    }

    pub fn app_with_limiter(&self, limiter: RequestRateLimiter) -> Router {
        let state = Arc::new(AppState {
            engine: self.engine.clone(),
            registration: self.registration.clone(),
            shared_secret: Credential::new(SHARED_SECRET),
            public_url: Url::parse(PUBLIC_URL).unwrap(),
        });
        router(state, limiter)
    }
}
