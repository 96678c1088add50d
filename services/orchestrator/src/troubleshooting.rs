//! Canned remediation guides. Selecting one never touches stored data.

use crate::classify::mentions;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Guide {
    Backend,
    Database,
    Docker,
    Frontend,
    General,
}

/// Checked in order; the first selector with a matching keyword wins.
const SELECTORS: &[(Guide, &[&str])] = &[
    (Guide::Backend, &["backend", "api", "500"]),
    (Guide::Database, &["database", "postgres"]),
    (Guide::Docker, &["docker"]),
    (Guide::Frontend, &["frontend", "react"]),
];

impl Guide {
    pub fn select(message: &str) -> Guide {
        SELECTORS
            .iter()
            .find(|(_, keywords)| mentions(message, keywords))
            .map_or(Guide::General, |(guide, _)| *guide)
    }

    pub fn text(self) -> &'static str {
        match self {
            Guide::Backend => BACKEND,
            Guide::Database => DATABASE,
            Guide::Docker => DOCKER,
            Guide::Frontend => FRONTEND,
            Guide::General => GENERAL,
        }
    }
}

pub fn respond(message: &str) -> String {
    Guide::select(message).text().to_string()
}

const BACKEND: &str = "**Backend/API Issues:**

1. Check the service answers: `curl http://localhost:8080/health`
2. Run it with verbose logs: `RUST_LOG=debug orchestrator`
3. Confirm the environment: `DATABASE_URL`, `LLM_PROVIDER` and the provider key are set

Common causes:
- Port 8080 already in use (`ORCH_BIND_ADDR` changes it)
- Database unreachable at startup
- Missing or invalid environment variables (the service refuses to start and names the variable)";

const DATABASE: &str = "**Database Issues:**

1. Check PostgreSQL is accepting connections: `pg_isready -h localhost -p 5432`
2. Verify `DATABASE_URL` points at the right database and user
3. Restart the service: migrations are applied automatically on startup

Common causes:
- Database not created yet
- Wrong credentials
- Port 5432 taken by another instance";

const DOCKER: &str = "**Docker Issues:**

1. Check containers: `docker compose ps`
2. Follow all logs: `docker compose logs -f`
3. Restart everything: `docker compose restart`
4. Fresh start: `docker compose down && docker compose up -d`

Common causes:
- Docker daemon not running
- Port conflicts between containers and local services
- Out of disk space";

const FRONTEND: &str = "**Frontend Issues:**

1. Open the browser console (F12) and look for failed requests
2. Verify the API base URL the UI is built with
3. Reinstall dependencies and restart the dev server

Common causes:
- CORS errors from a mismatched API origin
- Wrong API endpoint in the UI environment
- Stale build artifacts";

const GENERAL: &str = "**General Troubleshooting:**

1. Check services: `docker compose ps` should list everything as running
2. Read the logs: `docker compose logs -f` and look for errors
3. Test the API: `curl http://localhost:8080/health`

Quick fixes:
- Restart everything: `docker compose restart`
- Re-upload and re-apply the dataset if numbers look wrong

What specific error are you seeing?";
