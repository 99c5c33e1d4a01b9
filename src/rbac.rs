//! ロールコードとエンドポイントの必要権限レベルの判定。

/// 全エンドポイントへのアクセスを許可する管理者ロール。
pub const ADMIN: i32 = 1;

/// 認証済みであれば誰でもアクセスできるエンドポイントの権限レベル。
pub const ALL_USERS: i32 = 999;

/// ロール一覧が必要権限レベルを満たすかを判定する。
///
/// 1. `ADMIN` を含めば常に true
/// 2. `required` を含めば true
/// 3. `required` が `ALL_USERS` なら（ロールが空でも）true
pub fn satisfies(roles: &[i32], required: i32) -> bool {
    if roles.contains(&ADMIN) {
        return true;
    }
    if roles.contains(&required) {
        return true;
    }
    required == ALL_USERS
}
