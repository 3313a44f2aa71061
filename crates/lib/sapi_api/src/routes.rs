//! Route paths.

pub const POST_AUTH_SIGNUP: &str = "/auth/signup";
pub const POST_AUTH_SIGNIN: &str = "/auth/signin";
pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
pub const POST_AUTH_LOGOUT: &str = "/auth/logout";

/// `GET` and `PUT`.
pub const USER_PROFILE: &str = "/user/profile";
pub const PUT_USER_PROFILE_RESET_PASSWORD: &str = "/user/profile/reset-password";
pub const GET_USERS_ID: &str = "/users/{id}";

/// `GET` and `POST`.
pub const TODOS: &str = "/todos";
/// `GET`, `PUT` and `DELETE`.
pub const TODOS_ID: &str = "/todos/{id}";

pub const GET_ADMIN_USERS: &str = "/admin/users";
/// `GET`, `PUT` and `DELETE`.
pub const ADMIN_USERS_ID: &str = "/admin/users/{id}";
pub const POST_ADMIN_USERS_ID_BLOCK: &str = "/admin/users/{id}/block";
pub const POST_ADMIN_USERS_ID_UNBLOCK: &str = "/admin/users/{id}/unblock";
pub const POST_ADMIN_USERS_ID_RIGHTS: &str = "/admin/users/{id}/rights";
