use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

/// 键值存储接口
///
/// 会话层唯一的持久化依赖。实现方负责给所有键加上应用前缀，
/// 并在枚举结果中去掉前缀，调用方看到的永远是不带前缀的键。
#[async_trait]
pub trait KvStore: Send + Sync {
    /// 写入并设置过期时间
    async fn set_one(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// 读取，不存在或已过期返回 `StoreError::NotFound`
    async fn get_one(&self, key: &str) -> Result<String, StoreError>;

    /// 删除，键不存在不算错误
    async fn delete_one(&self, key: &str) -> Result<(), StoreError>;

    /// 按 glob 模式枚举键（`*`、`?`、`[...]`、`\` 转义）
    async fn find_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// 存活检查
    async fn ping(&self) -> Result<(), StoreError>;
}

const GLOB_SPECIAL: [char; 5] = ['*', '?', '[', ']', '\\'];

/// 转义 glob 元字符，使字面量只匹配自身
pub fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        if GLOB_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// 与 Redis `KEYS`/`SCAN MATCH` 相同方言的 glob 匹配
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    match_from(&p, &t)
}

fn match_from(p: &[char], t: &[char]) -> bool {
    let (mut pi, mut ti) = (0usize, 0usize);
    // 最近一个 '*' 的位置，用于回溯
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() {
            match p[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next)) = match_class(p, pi, t[ti]) {
                        if matched {
                            pi = next;
                            ti += 1;
                            continue;
                        }
                    }
                }
                '\\' if pi + 1 < p.len() => {
                    if p[pi + 1] == t[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c => {
                    if c == t[ti] {
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
            }
        }

        match star {
            Some((sp, st)) => {
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// 解析 `[...]` 字符类，返回 (是否匹配, 字符类之后的位置)
fn match_class(p: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negate = i < p.len() && p[i] == '^';
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < p.len() && p[i] != ']' {
        if p[i] == '\\' && i + 1 < p.len() {
            matched |= p[i + 1] == c;
            i += 2;
        } else if i + 2 < p.len() && p[i + 1] == '-' && p[i + 2] != ']' {
            let (lo, hi) = if p[i] <= p[i + 2] {
                (p[i], p[i + 2])
            } else {
                (p[i + 2], p[i])
            };
            matched |= lo <= c && c <= hi;
            i += 3;
        } else {
            matched |= p[i] == c;
            i += 1;
        }
    }

    if i >= p.len() {
        // 未闭合的 '['
        return None;
    }
    Some((matched != negate, i + 1))
}
