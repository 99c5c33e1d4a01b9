//! ルートテンプレートとエンドポイント権限テーブル。
//!
//! テンプレートは `/` 区切りのセグメント列で、`:` で始まるセグメントは
//! 任意の 1 セグメント（空を除く）にマッチするパラメータとして扱う。

use std::collections::BTreeMap;

use tracing::warn;

const PARAM_MARKER: char = ':';

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

/// RouteTemplate は `/api/test/:id` のようなパステンプレート。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl RouteTemplate {
    pub fn parse(template: &str) -> Self {
        let segments = split_path(template)
            .into_iter()
            .map(|s| {
                if s.starts_with(PARAM_MARKER) {
                    Segment::Param
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        Self {
            raw: template.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// リクエストパスがこのテンプレートの形にマッチするかを判定する。
    /// パラメータの値は検査しない。
    pub fn matches(&self, path: &str) -> bool {
        let request = split_path(path);
        if request.len() != self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(request)
            .all(|(template, actual)| match template {
                Segment::Param => !actual.is_empty(),
                Segment::Literal(lit) => lit == actual,
            })
    }

    /// 両方のテンプレートにマッチしうるパスが存在するかを判定する。
    fn overlaps(&self, other: &RouteTemplate) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| match (a, b) {
                    (Segment::Literal(x), Segment::Literal(y)) => x == y,
                    _ => true,
                })
    }
}

/// 前後の `/` を取り除いて分割する。空文字列はセグメント 0 個。
fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        Vec::new()
    } else {
        trimmed.split('/').collect()
    }
}

/// PermissionTable はルートテンプレートから必要権限レベルへの対応表。
///
/// 起動時に一度だけ構築し、以後は読み取り専用で共有する。
/// 検索は登録順に行い、最初にマッチしたエントリを採用する。
/// 重なり合うテンプレートを登録しないことは呼び出し側の責務で、
/// 重なりを検出した場合は警告ログを出す。
#[derive(Debug, Clone, Default)]
pub struct PermissionTable {
    entries: Vec<(RouteTemplate, i32)>,
}

impl PermissionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 設定ファイルのマップから構築する。登録順はキーの辞書順になる。
    pub fn from_map(map: &BTreeMap<String, i32>) -> Self {
        let mut table = Self::new();
        for (template, level) in map {
            table.insert(template, *level);
        }
        table
    }

    /// ビルダー形式でエントリを追加する。
    pub fn route(mut self, template: &str, level: i32) -> Self {
        self.insert(template, level);
        self
    }

    pub fn insert(&mut self, template: &str, level: i32) {
        let parsed = RouteTemplate::parse(template);
        if let Some((existing, _)) = self.entries.iter().find(|(t, _)| t.overlaps(&parsed)) {
            warn!(
                template = template,
                existing = existing.as_str(),
                "ルートテンプレートが既存のエントリと重なっています。先に登録されたものが優先されます"
            );
        }
        self.entries.push((parsed, level));
    }

    /// パスに対応する必要権限レベルを返す。マッチしなければ None。
    pub fn resolve(&self, path: &str) -> Option<i32> {
        self.entries
            .iter()
            .find(|(template, _)| template.matches(path))
            .map(|(_, level)| *level)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
