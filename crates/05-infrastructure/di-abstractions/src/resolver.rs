//! 解析上下文
//!
//! 记录容器内正在进行的解析链，用于循环依赖检测和深度限制

use crate::container::ContainerConfig;
use crate::token::Token;
use infrastructure_common::{DependencyError, DependencyResult};

/// 解析上下文
#[derive(Debug, Clone)]
pub struct ResolveContext {
    /// 当前解析链，用于检测循环依赖
    pub resolution_chain: Vec<Token>,
    /// 解析选项
    pub options: ResolveOptions,
}

impl ResolveContext {
    /// 创建新的解析上下文
    pub fn new(options: ResolveOptions) -> Self {
        Self {
            resolution_chain: Vec::new(),
            options,
        }
    }

    /// 添加令牌到解析链
    pub fn push_token(&mut self, token: &Token) -> DependencyResult<()> {
        if self.options.detect_cycles && self.resolution_chain.contains(token) {
            let chain = self
                .resolution_chain
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" -> ");

            return Err(DependencyError::CircularDependency {
                dependency_chain: format!("{} -> {}", chain, token),
            });
        }

        if self.resolution_chain.len() >= self.options.max_depth {
            return Err(DependencyError::ResolutionDepthExceeded {
                token: token.to_string(),
                depth: self.options.max_depth,
            });
        }

        self.resolution_chain.push(token.clone());
        Ok(())
    }

    /// 从解析链中移除令牌
    pub fn pop_token(&mut self) {
        self.resolution_chain.pop();
    }

    /// 当前解析深度
    pub fn depth(&self) -> usize {
        self.resolution_chain.len()
    }
}

/// 解析选项
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// 是否检测循环依赖
    pub detect_cycles: bool,
    /// 最大递归深度
    pub max_depth: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self::from(&ContainerConfig::default())
    }
}

impl From<&ContainerConfig> for ResolveOptions {
    fn from(config: &ContainerConfig) -> Self {
        Self {
            detect_cycles: config.enable_circular_dependency_detection,
            max_depth: config.max_resolution_depth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_reports_full_chain() {
        let mut context = ResolveContext::new(ResolveOptions::default());
        let a = Token::name("A");
        let b = Token::name("B");

        context.push_token(&a).unwrap();
        context.push_token(&b).unwrap();

        match context.push_token(&a) {
            Err(DependencyError::CircularDependency { dependency_chain }) => {
                assert_eq!(dependency_chain, "A -> B -> A");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        context.pop_token();
        assert_eq!(context.depth(), 1);
    }

    #[test]
    fn test_depth_limit() {
        let mut context = ResolveContext::new(ResolveOptions {
            detect_cycles: false,
            max_depth: 2,
        });

        context.push_token(&Token::name("A")).unwrap();
        context.push_token(&Token::name("A")).unwrap();
        assert!(matches!(
            context.push_token(&Token::name("A")),
            Err(DependencyError::ResolutionDepthExceeded { depth: 2, .. })
        ));
    }
}
